use super::Transport;
use crate::channel::ReplyRouter;
use crate::error::{Result, RpcError};
use crate::message::{Reply, ReplyStatus, Request};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;

type Handler = dyn Fn(&Request) -> ReplyStatus + Send + Sync;
type DelayFn = dyn Fn(&Request) -> Duration + Send + Sync;

/// In-process runtime: answers each request with a handler closure.
///
/// Replies are dispatched from a spawned task after an optional delay, so
/// they arrive asynchronously just as a remote one would.
pub struct LocalRuntime {
    handler: Arc<Handler>,
    delay: Arc<DelayFn>,
    wiring: Mutex<Option<(ReplyRouter, Handle)>>,
}

impl LocalRuntime {
    pub fn new(handler: impl Fn(&Request) -> ReplyStatus + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            delay: Arc::new(|_| Duration::ZERO),
            wiring: Mutex::new(None),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Per-request reply delay
    pub fn with_delay_fn(mut self, delay: impl Fn(&Request) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Arc::new(delay);
        self
    }
}

impl Transport for LocalRuntime {
    fn start(&self, router: ReplyRouter, runtime: &Handle) -> Result<()> {
        *self.wiring.lock().unwrap_or_else(|e| e.into_inner()) = Some((router, runtime.clone()));
        Ok(())
    }

    fn send(&self, request: Request) -> Result<()> {
        let (router, runtime) = self
            .wiring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| RpcError::Transport("local runtime not started".to_string()))?;

        let handler = Arc::clone(&self.handler);
        let delay = (self.delay)(&request);
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let status = handler(&request);
            router.deliver(Reply {
                tag: request.tag,
                status,
            });
        });
        Ok(())
    }

    fn close(&self) {
        self.wiring.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
