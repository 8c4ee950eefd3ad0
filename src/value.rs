use crate::error::SimError;
use std::fmt;

/// Value carried by task and test results.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    None,
    Int(i64),
    String(String),
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::None => write!(f, "None"),
            Val::Int(i) => write!(f, "{}", i),
            Val::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<SimError> for Val {
    fn from(e: SimError) -> Self {
        Val::String(e.to_string())
    }
}
