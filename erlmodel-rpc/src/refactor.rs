//! Rename refactorings carried out by the remote runtime
//!
//! The runtime does the work and answers with the files it touched. Nothing
//! is assumed about its state beyond what the reply says.

use crate::channel::RpcChannel;
use crate::error::RpcError;
use crate::value::Value;
use serde::Serialize;
use std::time::Duration;

const REFACTOR_MODULE: &str = "wrangler";

#[derive(Debug, thiserror::Error)]
pub enum RefactorError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Refactoring rejected: {0}")]
    Rejected(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl RefactorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rpc(e) => e.code(),
            Self::Rejected(_) => "refactor_rejected",
            Self::UnexpectedReply(_) => "unexpected_reply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactoringParams {
    pub file_path: String,
    pub line: i64,
    pub column: i64,
    pub new_name: String,
    pub search_path: Vec<String>,
    pub tab_width: i64,
}

impl RefactoringParams {
    pub fn new(file_path: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            line: 1,
            column: 1,
            new_name: new_name.into(),
            search_path: Vec::new(),
            tab_width: 8,
        }
    }

    pub fn at(mut self, line: i64, column: i64) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_search_path(mut self, search_path: Vec<String>) -> Self {
        self.search_path = search_path;
        self
    }

    fn search_path_value(&self) -> Value {
        Value::List(self.search_path.iter().map(|dir| Value::string(dir.as_str())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refactoring {
    RenameVariable,
    RenameFunction,
    RenameModule,
}

/// A file the runtime changed; `content` is set when it sent the new text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RefactoringOutcome {
    pub changed: Vec<ChangedFile>,
}

impl Refactoring {
    pub fn name(self) -> &'static str {
        match self {
            Self::RenameVariable => "Rename variable",
            Self::RenameFunction => "Rename function",
            Self::RenameModule => "Rename module",
        }
    }

    pub fn function(self) -> &'static str {
        match self {
            Self::RenameVariable => "rename_var_eclipse",
            Self::RenameFunction => "rename_fun_eclipse",
            Self::RenameModule => "rename_mod_eclipse",
        }
    }

    pub fn signature(self) -> &'static str {
        match self {
            Self::RenameVariable | Self::RenameFunction => "siisxi",
            Self::RenameModule => "ssxi",
        }
    }

    pub fn arguments(self, params: &RefactoringParams) -> Vec<Value> {
        match self {
            Self::RenameVariable | Self::RenameFunction => vec![
                Value::string(params.file_path.as_str()),
                Value::Integer(params.line),
                Value::Integer(params.column),
                Value::string(params.new_name.as_str()),
                params.search_path_value(),
                Value::Integer(params.tab_width),
            ],
            Self::RenameModule => vec![
                Value::string(params.file_path.as_str()),
                Value::string(params.new_name.as_str()),
                params.search_path_value(),
                Value::Integer(params.tab_width),
            ],
        }
    }

    pub fn run(
        self,
        channel: &RpcChannel,
        params: &RefactoringParams,
        timeout: Duration,
    ) -> Result<RefactoringOutcome, RefactorError> {
        tracing::debug!(refactoring = self.name(), file = %params.file_path, "running refactoring");
        let reply = channel.call(
            REFACTOR_MODULE,
            self.function(),
            self.signature(),
            self.arguments(params),
            timeout,
        )?;
        interpret_reply(&reply)
    }
}

fn interpret_reply(reply: &Value) -> Result<RefactoringOutcome, RefactorError> {
    let unexpected = || RefactorError::UnexpectedReply(reply.to_string());

    let [status, payload] = reply.as_tuple().ok_or_else(unexpected)? else {
        return Err(unexpected());
    };

    if status.is_atom("error") {
        let message = payload
            .as_text()
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());
        return Err(RefactorError::Rejected(message));
    }
    if !status.is_atom("ok") {
        return Err(unexpected());
    }

    let changed = payload
        .as_list()
        .ok_or_else(unexpected)?
        .iter()
        .map(|entry| changed_file(entry).ok_or_else(unexpected))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RefactoringOutcome { changed })
}

fn changed_file(entry: &Value) -> Option<ChangedFile> {
    if let Some(path) = entry.as_text() {
        return Some(ChangedFile {
            path: path.to_string(),
            content: None,
        });
    }
    match entry.as_tuple()? {
        [path, content] => Some(ChangedFile {
            path: path.as_text()?.to_string(),
            content: Some(content.as_text()?.to_string()),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(items)
    }

    #[test]
    fn test_arguments_match_signature() {
        let params = RefactoringParams::new("src/a.erl", "NewVar")
            .at(3, 7)
            .with_search_path(vec!["src".to_string()]);
        for refactoring in [
            Refactoring::RenameVariable,
            Refactoring::RenameFunction,
            Refactoring::RenameModule,
        ] {
            let sig = crate::Signature::parse(refactoring.signature()).unwrap();
            assert!(sig.encode(refactoring.arguments(&params)).is_ok(), "{:?}", refactoring);
        }
    }

    #[test]
    fn test_ok_reply_with_paths_and_contents() {
        let reply = tuple(vec![
            Value::atom("ok"),
            Value::List(vec![
                Value::string("src/a.erl"),
                tuple(vec![Value::string("src/b.erl"), Value::Binary(b"-module(b).".to_vec())]),
            ]),
        ]);
        let outcome = interpret_reply(&reply).unwrap();
        assert_eq!(outcome.changed.len(), 2);
        assert_eq!(outcome.changed[0].path, "src/a.erl");
        assert_eq!(outcome.changed[0].content, None);
        assert_eq!(outcome.changed[1].content.as_deref(), Some("-module(b)."));
    }

    #[test]
    fn test_error_reply_is_rejected() {
        let reply = tuple(vec![Value::atom("error"), Value::string("Invalid new variable name.")]);
        match interpret_reply(&reply) {
            Err(RefactorError::Rejected(msg)) => assert_eq!(msg, "Invalid new variable name."),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_other_shapes_are_unexpected() {
        for reply in [
            Value::atom("ok"),
            tuple(vec![Value::atom("maybe"), Value::List(vec![])]),
            tuple(vec![Value::atom("ok"), Value::Integer(1)]),
            tuple(vec![Value::atom("ok"), Value::List(vec![Value::Integer(1)])]),
        ] {
            assert!(
                matches!(interpret_reply(&reply), Err(RefactorError::UnexpectedReply(_))),
                "{}",
                reply
            );
        }
    }
}
