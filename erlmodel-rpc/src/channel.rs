//! Synchronous call channel with per-call timeouts
//!
//! Every call registers a oneshot sender under a fresh [`CorrelationTag`]
//! before the request goes out. Replies come back through the
//! [`ReplyRouter`], which hands each one to the sender waiting on its tag.
//! A reply with no waiter (late, unknown, or for a caller that gave up) is
//! discarded and counted. When the transport loses its runtime it fails the
//! waiting calls through the router instead of letting them time out.

use crate::error::{Result, RpcError};
use crate::message::{CorrelationTag, Reply, ReplyStatus, Request, TagCounter};
use crate::signature::Signature;
use crate::transport::Transport;
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// Counters over the lifetime of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Replies that arrived with nobody waiting for them
    pub discarded: u64,
}

type Waiter = oneshot::Sender<Result<Reply>>;

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<CorrelationTag, Waiter>>,
    stats: Mutex<ChannelStats>,
    closed: AtomicBool,
    /// Set once the transport reports its runtime gone
    disconnected: Mutex<Option<String>>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<CorrelationTag, Waiter>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn disconnected(&self) -> MutexGuard<'_, Option<String>> {
        self.disconnected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, ChannelStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Inbound side of a channel; the only way replies reach callers
#[derive(Clone)]
pub struct ReplyRouter {
    shared: Arc<Shared>,
}

impl ReplyRouter {
    /// Hand `reply` to its caller. Returns false if it was discarded.
    pub fn deliver(&self, reply: Reply) -> bool {
        let tag = reply.tag;
        let waiter = self.shared.pending().remove(&tag);

        let delivered = match waiter {
            Some(tx) => tx.send(Ok(reply)).is_ok(),
            None => false,
        };
        if !delivered {
            self.shared.stats().discarded += 1;
            tracing::warn!(tag = tag.0, "discarding reply with no waiting caller");
        }
        delivered
    }

    /// Fail the call waiting on `tag` with a transport error
    pub fn fail(&self, tag: CorrelationTag, reason: &str) -> bool {
        let waiter = self.shared.pending().remove(&tag);
        match waiter {
            Some(tx) => tx.send(Err(RpcError::Transport(reason.to_string()))).is_ok(),
            None => false,
        }
    }

    /// Fail every waiting call and refuse later ones; returns how many failed.
    ///
    /// For transports whose runtime has gone away.
    pub fn fail_all(&self, reason: &str) -> usize {
        *self.shared.disconnected() = Some(reason.to_string());
        let waiters: Vec<Waiter> = self.shared.pending().drain().map(|(_, tx)| tx).collect();
        let failed = waiters
            .into_iter()
            .map(|tx| tx.send(Err(RpcError::Transport(reason.to_string()))))
            .filter(std::result::Result::is_ok)
            .count();
        if failed > 0 {
            tracing::warn!(failed, reason, "failing pending calls");
        }
        failed
    }
}

pub struct RpcChannel {
    runtime: Runtime,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    tags: TagCounter,
}

impl RpcChannel {
    /// Start `transport` on a private runtime
    pub fn new(transport: impl Transport + 'static) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("erlmodel-rpc")
            .enable_all()
            .build()?;

        let shared = Arc::new(Shared::default());
        let transport: Arc<dyn Transport> = Arc::new(transport);
        transport.start(
            ReplyRouter {
                shared: Arc::clone(&shared),
            },
            runtime.handle(),
        )?;

        Ok(Self {
            runtime,
            transport,
            shared,
            tags: TagCounter::default(),
        })
    }

    /// Call `module:function(args)` and block until the reply or `timeout`.
    ///
    /// Must not be called from inside an async context.
    pub fn call(
        &self,
        module: &str,
        function: &str,
        signature: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.call_async(module, function, signature, args, timeout))
    }

    pub async fn call_async(
        &self,
        module: &str,
        function: &str,
        signature: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(RpcError::Closed);
        }
        if let Some(reason) = self.disconnect_reason() {
            return Err(RpcError::Transport(reason));
        }
        let args = Signature::parse(signature)?.encode(args)?;

        let request = Request {
            tag: self.tags.next(),
            module: module.to_string(),
            function: function.to_string(),
            args,
        };
        let tag = request.tag;
        let operation = request.operation();

        let (tx, rx) = oneshot::channel::<Result<Reply>>();
        self.shared.pending().insert(tag, tx);
        // The runtime may have gone between the check above and registering
        if let Some(reason) = self.disconnect_reason() {
            self.shared.pending().remove(&tag);
            return Err(RpcError::Transport(reason));
        }
        self.shared.stats().sent += 1;
        tracing::debug!(tag = tag.0, %operation, "sending request");

        if let Err(e) = self.transport.send(request) {
            self.shared.pending().remove(&tag);
            self.shared.stats().failed += 1;
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Err(e))) => {
                self.shared.stats().failed += 1;
                tracing::warn!(tag = tag.0, %operation, error = %e, "call failed");
                Err(e)
            }
            Ok(Ok(Ok(reply))) => match reply.status {
                ReplyStatus::Ok(value) => {
                    self.shared.stats().completed += 1;
                    Ok(value)
                }
                ReplyStatus::Error(payload) => {
                    self.shared.stats().failed += 1;
                    Err(RpcError::Remote { operation, payload })
                }
            },
            Ok(Err(_)) => {
                // Sender dropped by shutdown
                self.shared.stats().failed += 1;
                Err(RpcError::Closed)
            }
            Err(_) => {
                self.shared.pending().remove(&tag);
                self.shared.stats().timed_out += 1;
                tracing::warn!(tag = tag.0, %operation, ?timeout, "call timed out");
                Err(RpcError::Timeout {
                    tag: tag.0,
                    operation,
                    timeout,
                })
            }
        }
    }

    fn disconnect_reason(&self) -> Option<String> {
        self.shared.disconnected().clone()
    }

    pub fn stats(&self) -> ChannelStats {
        *self.shared.stats()
    }

    /// Calls currently waiting for a reply
    pub fn pending(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Fail every pending call with [`RpcError::Closed`] and refuse new ones
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = {
            let mut pending = self.shared.pending();
            let n = pending.len();
            pending.clear();
            n
        };
        self.transport.close();
        tracing::debug!(pending = dropped, "rpc channel shut down");
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
