//! Request and reply messages

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pairs a reply with the request that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationTag(pub u64);

impl fmt::Display for CorrelationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic tag source; one per channel
#[derive(Debug, Default)]
pub struct TagCounter {
    next: AtomicU64,
}

impl TagCounter {
    pub fn next(&self) -> CorrelationTag {
        CorrelationTag(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub tag: CorrelationTag,
    pub module: String,
    pub function: String,
    pub args: Vec<Value>,
}

impl Request {
    /// `module:function/arity`
    pub fn operation(&self) -> String {
        format!("{}:{}/{}", self.module, self.function, self.args.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok(Value),
    Error(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub tag: CorrelationTag,
    pub status: ReplyStatus,
}

impl Reply {
    pub fn ok(tag: CorrelationTag, value: Value) -> Self {
        Self {
            tag,
            status: ReplyStatus::Ok(value),
        }
    }

    pub fn error(tag: CorrelationTag, payload: Value) -> Self {
        Self {
            tag,
            status: ReplyStatus::Error(payload),
        }
    }
}
