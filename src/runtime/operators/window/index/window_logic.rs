use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::common::{Value, WindowError};

/// Inclusive document index range within a partition.
pub type WindowRange = RangeInclusive<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentBound {
    Unbounded,
    Current,
    /// Signed document offset from the current position.
    Offset(i64),
}

impl DocumentBound {
    fn offset(self) -> Option<i64> {
        match self {
            DocumentBound::Unbounded => None,
            DocumentBound::Current => Some(0),
            DocumentBound::Offset(k) => Some(k),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
    Unbounded,
    Current,
    /// Offset in sort-key space, already expressed in the sort order's direction.
    Offset(f64),
}

impl RangeBound {
    fn offset(self) -> Option<f64> {
        match self {
            RangeBound::Unbounded => None,
            RangeBound::Current => Some(0.0),
            RangeBound::Offset(v) => Some(v),
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        match self {
            RangeBound::Offset(v) => RangeBound::Offset(v * factor),
            other => other,
        }
    }
}

/// Fixed-width time units usable with range windows over dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "millisecond" => Some(TimeUnit::Millisecond),
            "second" => Some(TimeUnit::Second),
            "minute" => Some(TimeUnit::Minute),
            "hour" => Some(TimeUnit::Hour),
            "day" => Some(TimeUnit::Day),
            "week" => Some(TimeUnit::Week),
            _ => None,
        }
    }

    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
            TimeUnit::Week => 604_800_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowBounds {
    Documents {
        lower: DocumentBound,
        upper: DocumentBound,
    },
    Range {
        lower: RangeBound,
        upper: RangeBound,
        unit: Option<TimeUnit>,
    },
}

impl Default for WindowBounds {
    fn default() -> Self {
        WindowBounds::Documents {
            lower: DocumentBound::Unbounded,
            upper: DocumentBound::Unbounded,
        }
    }
}

impl WindowBounds {
    pub fn is_range(&self) -> bool {
        matches!(self, WindowBounds::Range { .. })
    }

    /// Rejects bounds whose lower offset lies after the upper offset.
    pub fn validate(&self, field: &str) -> Result<(), WindowError> {
        match *self {
            WindowBounds::Documents { lower, upper } => {
                if let (Some(lo), Some(hi)) = (lower.offset(), upper.offset()) {
                    if lo > hi {
                        return Err(WindowError::invalid_window(
                            field,
                            format!("lower bound {} must not exceed upper bound {}", lo, hi),
                        ));
                    }
                }
            }
            WindowBounds::Range { lower, upper, unit } => {
                for offset in [lower.offset(), upper.offset()].into_iter().flatten() {
                    if !offset.is_finite() {
                        return Err(WindowError::invalid_window(field, "range bounds must be finite"));
                    }
                    if unit.is_some() && offset.fract() != 0.0 {
                        return Err(WindowError::invalid_window(
                            field,
                            "range bounds with a unit must be integers",
                        ));
                    }
                }
                if let (Some(lo), Some(hi)) = (lower.offset(), upper.offset()) {
                    if lo > hi {
                        return Err(WindowError::invalid_window(
                            field,
                            format!("lower bound {} must not exceed upper bound {}", lo, hi),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Resolves a document-bounded window for the document at `position` in a
/// partition of `len` documents.
///
/// Offsets are applied in signed space and the result intersected with the
/// partition, so a window lying entirely past either end is empty.
pub fn resolve_document_window(
    lower: DocumentBound,
    upper: DocumentBound,
    position: usize,
    len: usize,
) -> Option<WindowRange> {
    if len == 0 {
        return None;
    }
    let last = len as i64 - 1;
    let pos = position as i64;
    let start = match lower.offset() {
        None => 0,
        Some(k) => pos.saturating_add(k).max(0),
    };
    let end = match upper.offset() {
        None => last,
        Some(k) => pos.saturating_add(k).min(last),
    };
    if start > end {
        None
    } else {
        Some(start as usize..=end as usize)
    }
}

/// Resolves a range-bounded window over `keys`, which must be ascending.
pub fn resolve_range_window(
    keys: &[f64],
    lower: RangeBound,
    upper: RangeBound,
    position: usize,
) -> Option<WindowRange> {
    let current = *keys.get(position)?;
    let start = match lower.offset() {
        None => 0,
        Some(offset) => {
            let lo = current + offset;
            keys.partition_point(|k| *k < lo)
        }
    };
    let end = match upper.offset() {
        None => keys.len(),
        Some(offset) => {
            let hi = current + offset;
            keys.partition_point(|k| *k <= hi)
        }
    };
    if start >= end {
        None
    } else {
        Some(start..=end - 1)
    }
}

/// Extracts the numeric sort keys a range window does arithmetic on.
///
/// Keys are negated for descending sorts so the result is always ascending.
/// With a `unit` every key must be a date (in milliseconds), otherwise a number.
pub fn range_sort_keys(
    values: &[Value],
    unit: Option<TimeUnit>,
    descending: bool,
    field: &str,
    start_position: usize,
) -> Result<Vec<f64>, WindowError> {
    let sign = if descending { -1.0 } else { 1.0 };
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let key = match (unit, value) {
                (Some(_), Value::Date(millis)) => Ok(*millis as f64),
                (Some(_), other) => Err(format!(
                    "a range window with a unit requires a date sortBy value, found {}",
                    other.type_name()
                )),
                (None, Value::Date(_)) => {
                    Err("a range window over a date sortBy value requires a unit".to_string())
                }
                (None, other) => match other.coerce_to_f64() {
                    Some(v) if !v.is_nan() => Ok(v),
                    Some(_) => Err("sortBy value must not be NaN".to_string()),
                    None => Err(format!(
                        "a range window requires a numeric sortBy value, found {}",
                        other.type_name()
                    )),
                },
            };
            key.map(|k| k * sign).map_err(|reason| WindowError::RangeSortKey {
                field: field.to_string(),
                position: start_position + i,
                reason,
            })
        })
        .collect()
}
