//! Transports carry requests to a runtime and route its replies back

mod local;
mod stdio;

pub use local::LocalRuntime;
pub use stdio::StdioTransport;

use crate::channel::ReplyRouter;
use crate::error::Result;
use crate::message::Request;
use tokio::runtime::Handle;

pub trait Transport: Send + Sync {
    /// Called once by the channel before any request is sent.
    ///
    /// Background work belongs on `runtime`; replies go to `router`.
    fn start(&self, router: ReplyRouter, runtime: &Handle) -> Result<()> {
        let _ = (router, runtime);
        Ok(())
    }

    /// Queue `request` for delivery without waiting for its reply
    fn send(&self, request: Request) -> Result<()>;

    fn close(&self) {}
}
