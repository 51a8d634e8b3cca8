//! erlmodel RPC - synchronous calls into an Erlang runtime
//!
//! Requests carry a correlation tag and are answered asynchronously by a
//! [`Transport`]. [`RpcChannel::call`] blocks the calling thread until the
//! matching reply arrives or the call times out.

pub mod channel;
pub mod error;
pub mod message;
pub mod refactor;
pub mod signature;
pub mod transport;
pub mod value;

pub use channel::{ChannelStats, ReplyRouter, RpcChannel};
pub use error::{Result, RpcError};
pub use message::{CorrelationTag, Reply, ReplyStatus, Request, TagCounter};
pub use refactor::{ChangedFile, RefactorError, Refactoring, RefactoringOutcome, RefactoringParams};
pub use signature::{ArgType, Signature};
pub use transport::{LocalRuntime, StdioTransport, Transport};
pub use value::Value;
