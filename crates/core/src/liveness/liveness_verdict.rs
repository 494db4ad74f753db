use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Optional prompt the subject was asked to perform during capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Challenge {
    Blink,
    TurnHead,
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Challenge::Blink => "blink",
            Challenge::TurnHead => "turn-head",
        })
    }
}

impl FromStr for Challenge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blink" => Ok(Challenge::Blink),
            "turn-head" | "turn_head" | "turn" => Ok(Challenge::TurnHead),
            other => Err(format!("unknown challenge {other:?}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DebugValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl From<bool> for DebugValue {
    fn from(v: bool) -> Self {
        DebugValue::Bool(v)
    }
}

impl From<usize> for DebugValue {
    fn from(v: usize) -> Self {
        DebugValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for DebugValue {
    fn from(v: f64) -> Self {
        DebugValue::Number(v)
    }
}

impl From<&str> for DebugValue {
    fn from(v: &str) -> Self {
        DebugValue::Text(v.to_string())
    }
}

impl From<String> for DebugValue {
    fn from(v: String) -> Self {
        DebugValue::Text(v)
    }
}

/// Outcome of a liveness check. `debug` always holds a `reason`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LivenessVerdict {
    pub is_live: bool,
    pub debug: BTreeMap<String, DebugValue>,
}

impl LivenessVerdict {
    pub fn reason(&self) -> Option<&str> {
        match self.debug.get("reason") {
            Some(DebugValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric debug entry, integers widened to f64.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.debug.get(key)? {
            DebugValue::Number(v) => Some(*v),
            DebugValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.debug.get(key)? {
            DebugValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Accumulates debug entries while a verdict is being computed.
#[derive(Default)]
pub(crate) struct DebugMap(BTreeMap<String, DebugValue>);

impl DebugMap {
    pub fn set(&mut self, key: &str, value: impl Into<DebugValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn finish(mut self, is_live: bool, reason: impl Into<String>) -> LivenessVerdict {
        self.set("reason", reason.into());
        LivenessVerdict {
            is_live,
            debug: self.0,
        }
    }
}
