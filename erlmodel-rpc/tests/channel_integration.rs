//! Channel behavior against an in-process runtime

use erlmodel_rpc::{
    LocalRuntime, RefactorError, Refactoring, RefactoringParams, ReplyRouter, ReplyStatus, Request,
    RpcChannel, RpcError, Transport, Value,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn echo(request: &Request) -> ReplyStatus {
    ReplyStatus::Ok(Value::Tuple(vec![
        Value::atom(request.function.as_str()),
        Value::List(request.args.clone()),
    ]))
}

#[test]
fn test_call_returns_reply_payload() {
    let channel = RpcChannel::new(LocalRuntime::new(echo)).unwrap();

    let value = channel
        .call("lists", "reverse", "l", vec![Value::List(vec![Value::Integer(1)])], Duration::from_secs(1))
        .unwrap();

    assert_eq!(
        value,
        Value::Tuple(vec![
            Value::atom("reverse"),
            Value::List(vec![Value::List(vec![Value::Integer(1)])]),
        ])
    );
    let stats = channel.stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(channel.pending(), 0);
}

#[test]
fn test_timeout_then_late_reply_discarded() {
    let runtime = LocalRuntime::new(echo).with_delay(Duration::from_millis(50));
    let channel = RpcChannel::new(runtime).unwrap();

    let err = channel
        .call("m", "slow", "", vec![], Duration::from_millis(10))
        .unwrap_err();
    match err {
        RpcError::Timeout { operation, timeout, .. } => {
            assert_eq!(operation, "m:slow/0");
            assert_eq!(timeout, Duration::from_millis(10));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(channel.pending(), 0);

    // Let the late reply arrive
    let deadline = Instant::now() + Duration::from_secs(2);
    while channel.stats().discarded == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let stats = channel.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.timed_out, 1);

    // The channel is still usable for a call that waits long enough
    let value = channel
        .call("m", "slow", "", vec![], Duration::from_secs(2))
        .unwrap();
    assert_eq!(value, Value::Tuple(vec![Value::atom("slow"), Value::List(vec![])]));
}

#[test]
fn test_error_reply_is_remote_error() {
    let runtime = LocalRuntime::new(|_| ReplyStatus::Error(Value::atom("undef")));
    let channel = RpcChannel::new(runtime).unwrap();

    let err = channel
        .call("nope", "missing", "a", vec![Value::string("x")], Duration::from_secs(1))
        .unwrap_err();
    match err {
        RpcError::Remote { operation, payload } => {
            assert_eq!(operation, "nope:missing/1");
            assert_eq!(payload, Value::atom("undef"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(channel.stats().failed, 1);
}

#[test]
fn test_bad_arguments_never_sent() {
    let channel = RpcChannel::new(LocalRuntime::new(echo)).unwrap();

    let err = channel
        .call("m", "f", "i", vec![Value::string("one")], Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, RpcError::Signature(_)));
    assert_eq!(channel.stats().sent, 0);
}

#[test]
fn test_concurrent_calls_are_independent() {
    // The first caller's reply is slow; it must not hold up the others
    let runtime = LocalRuntime::new(echo).with_delay_fn(|request| {
        if request.function == "slow" {
            Duration::from_millis(300)
        } else {
            Duration::from_millis(5)
        }
    });
    let channel = Arc::new(RpcChannel::new(runtime).unwrap());

    let slow = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.call("m", "slow", "", vec![], Duration::from_secs(5)))
    };
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let fast: Vec<_> = (0..4i64)
        .map(|n| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                channel.call("m", "fast", "i", vec![Value::Integer(n)], Duration::from_secs(5))
            })
        })
        .collect();
    for (n, handle) in fast.into_iter().enumerate() {
        let value = handle.join().unwrap().unwrap();
        assert_eq!(
            value,
            Value::Tuple(vec![
                Value::atom("fast"),
                Value::List(vec![Value::Integer(n as i64)]),
            ])
        );
    }
    assert!(started.elapsed() < Duration::from_millis(250));

    assert!(slow.join().unwrap().is_ok());
    assert_eq!(channel.stats().completed, 5);
}

#[test]
fn test_shutdown_fails_pending_calls() {
    let runtime = LocalRuntime::new(echo).with_delay(Duration::from_millis(500));
    let channel = Arc::new(RpcChannel::new(runtime).unwrap());

    let waiter = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || channel.call("m", "f", "", vec![], Duration::from_secs(5)))
    };
    let deadline = Instant::now() + Duration::from_secs(2);
    while channel.pending() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    channel.shutdown();
    assert!(matches!(waiter.join().unwrap(), Err(RpcError::Closed)));
    assert!(matches!(
        channel.call("m", "f", "", vec![], Duration::from_secs(1)),
        Err(RpcError::Closed)
    ));
}

#[test]
fn test_rename_variable_round_trip() {
    let runtime = LocalRuntime::new(|request| {
        assert_eq!(request.module, "wrangler");
        assert_eq!(request.function, "rename_var_eclipse");
        let file = request.args[0].clone();
        ReplyStatus::Ok(Value::Tuple(vec![Value::atom("ok"), Value::List(vec![file])]))
    });
    let channel = RpcChannel::new(runtime).unwrap();

    let params = RefactoringParams::new("src/a.erl", "Count").at(4, 9);
    let outcome = Refactoring::RenameVariable
        .run(&channel, &params, Duration::from_secs(1))
        .unwrap();
    assert_eq!(outcome.changed.len(), 1);
    assert_eq!(outcome.changed[0].path, "src/a.erl");
}

#[test]
fn test_refactoring_timeout_surfaces_as_rpc_error() {
    let runtime = LocalRuntime::new(echo).with_delay(Duration::from_millis(200));
    let channel = RpcChannel::new(runtime).unwrap();

    let params = RefactoringParams::new("src/a.erl", "b");
    let err = Refactoring::RenameModule
        .run(&channel, &params, Duration::from_millis(10))
        .unwrap_err();
    assert!(matches!(err, RefactorError::Rpc(RpcError::Timeout { .. })));
}

/// Rejects requests for `broken:*` as undeliverable and answers the rest
#[derive(Default)]
struct Rejecting {
    router: Mutex<Option<ReplyRouter>>,
}

impl Transport for Rejecting {
    fn start(&self, router: ReplyRouter, _runtime: &tokio::runtime::Handle) -> erlmodel_rpc::Result<()> {
        *self.router.lock().unwrap() = Some(router);
        Ok(())
    }

    fn send(&self, request: Request) -> erlmodel_rpc::Result<()> {
        let router = self.router.lock().unwrap().clone().unwrap();
        if request.module == "broken" {
            router.fail(request.tag, "cannot encode request");
        } else {
            router.deliver(erlmodel_rpc::Reply::ok(request.tag, Value::atom("ok")));
        }
        Ok(())
    }
}

#[test]
fn test_failed_delivery_is_not_a_timeout() {
    let channel = RpcChannel::new(Rejecting::default()).unwrap();

    let started = Instant::now();
    let err = channel
        .call("broken", "f", "", vec![], Duration::from_secs(10))
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport(msg) if msg == "cannot encode request"));
    assert!(started.elapsed() < Duration::from_secs(5));

    // Only that call failed
    let value = channel.call("m", "f", "", vec![], Duration::from_secs(1)).unwrap();
    assert_eq!(value, Value::atom("ok"));
    let stats = channel.stats();
    assert_eq!((stats.failed, stats.completed, stats.timed_out), (1, 1, 0));
}
