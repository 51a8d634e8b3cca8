//! Letter-coded argument signatures
//!
//! Each letter types one positional argument:
//!
//! | code | type    |
//! |------|---------|
//! | `a`  | atom    |
//! | `s`  | string  |
//! | `i`  | integer |
//! | `f`  | float   |
//! | `o`  | boolean |
//! | `b`  | binary  |
//! | `l`  | list    |
//! | `t`  | tuple   |
//! | `x`  | any     |

use crate::error::{Result, RpcError};
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Atom,
    String,
    Integer,
    Float,
    Boolean,
    Binary,
    List,
    Tuple,
    Any,
}

impl ArgType {
    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'a' => Self::Atom,
            's' => Self::String,
            'i' => Self::Integer,
            'f' => Self::Float,
            'o' => Self::Boolean,
            'b' => Self::Binary,
            'l' => Self::List,
            't' => Self::Tuple,
            'x' => Self::Any,
            _ => return None,
        })
    }

    fn code(self) -> char {
        match self {
            Self::Atom => 'a',
            Self::String => 's',
            Self::Integer => 'i',
            Self::Float => 'f',
            Self::Boolean => 'o',
            Self::Binary => 'b',
            Self::List => 'l',
            Self::Tuple => 't',
            Self::Any => 'x',
        }
    }

    /// Coerce `value` to this type, or give it back unchanged on mismatch
    fn coerce(self, value: Value) -> std::result::Result<Value, Value> {
        match (self, value) {
            (Self::Any, v) => Ok(v),
            (Self::Atom, v @ Value::Atom(_)) => Ok(v),
            (Self::Atom, Value::String(s)) => Ok(Value::Atom(s)),
            (Self::String, v @ Value::String(_)) => Ok(v),
            (Self::Integer, v @ Value::Integer(_)) => Ok(v),
            (Self::Float, v @ Value::Float(_)) => Ok(v),
            (Self::Float, Value::Integer(n)) => Ok(Value::Float(n as f64)),
            (Self::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (Self::Binary, v @ Value::Binary(_)) => Ok(v),
            (Self::Binary, Value::String(s)) => Ok(Value::Binary(s.into_bytes())),
            (Self::List, v @ Value::List(_)) => Ok(v),
            (Self::Tuple, v @ Value::Tuple(_)) => Ok(v),
            (_, v) => Err(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    args: Vec<ArgType>,
}

impl Signature {
    pub fn parse(codes: &str) -> Result<Self> {
        let args = codes
            .chars()
            .map(|c| {
                ArgType::from_code(c)
                    .ok_or_else(|| RpcError::Signature(format!("unknown type code {:?} in {:?}", c, codes)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { args })
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn arg_types(&self) -> &[ArgType] {
        &self.args
    }

    /// Check `args` against the signature and convert them to wire form
    pub fn encode(&self, args: Vec<Value>) -> Result<Vec<Value>> {
        if args.len() != self.args.len() {
            return Err(RpcError::Signature(format!(
                "signature {} expects {} arguments, got {}",
                self,
                self.args.len(),
                args.len()
            )));
        }

        self.args
            .iter()
            .zip(args)
            .enumerate()
            .map(|(position, (ty, value))| {
                ty.coerce(value).map_err(|value| {
                    RpcError::Signature(format!(
                        "argument {} of {}: expected {:?}, got {}",
                        position + 1,
                        self,
                        ty,
                        value
                    ))
                })
            })
            .collect()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.args {
            write!(f, "{}", ty.code())?;
        }
        Ok(())
    }
}
