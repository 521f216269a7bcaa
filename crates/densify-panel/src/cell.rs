//! Cell values and the tri-state cell used during forward fill.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A reported value. Sources carry both numeric and categorical columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric observation
    Number(f64),
    /// Categorical observation (status codes and the like)
    Text(String),
}

impl Value {
    /// Numeric value, treating NaN as "not reported".
    pub fn number(v: f64) -> Option<Self> {
        (!v.is_nan()).then_some(Self::Number(v))
    }

    /// Numeric payload, if any.
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }

    /// Total order used to pick a single value among duplicates.
    ///
    /// Numbers compare by IEEE total order, text lexicographically, and every
    /// number sorts below every text value.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Fill-time state of a panel cell.
///
/// `Missing` is a real observation (the source reported null). It replaces
/// whatever was carried before it and is carried forward itself. `Unknown`
/// means no observation has been seen yet. Both materialize to null.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    /// No record at or before this date
    #[default]
    Unknown,
    /// A record exists and reported null
    Missing,
    /// A record exists and reported a value
    Value(Value),
}

impl Cell {
    /// Cell for a value as reported by a source (`None` means reported null).
    pub fn reported(value: Option<Value>) -> Self {
        value.map_or(Self::Missing, Self::Value)
    }

    /// Starting cell for a walk continued from a materialized panel row.
    ///
    /// A null in a persisted panel cannot be told apart from "never seen", so
    /// it seeds as `Unknown`; both render as null either way.
    pub fn seed(value: Option<&Value>) -> Self {
        value.map_or(Self::Unknown, |v| Self::Value(v.clone()))
    }

    /// Whether an observation (possibly null) has been seen.
    pub const fn is_observed(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// The reported value, if any.
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unknown | Self::Missing => None,
        }
    }

    /// Convert to the persisted representation.
    pub fn materialize(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unknown | Self::Missing => None,
        }
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}
