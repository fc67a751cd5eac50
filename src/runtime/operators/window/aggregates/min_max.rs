use std::collections::{BTreeMap, VecDeque};

use crate::common::{Value, WindowError};

use super::Accumulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Min,
    Max,
}

/// Smallest or largest non-null value of the window under the canonical value order.
///
/// Values are held in an ordered multiset. Values that compare equal but differ in
/// representation (`1` and `1.0`) share a bucket in arrival order; the earliest
/// one is reported, as a fresh scan of the window would.
#[derive(Debug, Clone)]
pub struct MinMaxAccumulator {
    sense: Sense,
    values: BTreeMap<Value, VecDeque<Value>>,
}

impl MinMaxAccumulator {
    pub fn min() -> Self {
        Self::new(Sense::Min)
    }

    pub fn max() -> Self {
        Self::new(Sense::Max)
    }

    fn new(sense: Sense) -> Self {
        Self {
            sense,
            values: BTreeMap::new(),
        }
    }
}

impl Accumulator for MinMaxAccumulator {
    fn name(&self) -> &'static str {
        match self.sense {
            Sense::Min => "$min",
            Sense::Max => "$max",
        }
    }

    fn update(&mut self, value: &Value) {
        if value.is_nullish() {
            return;
        }
        self.values
            .entry(value.clone())
            .or_default()
            .push_back(value.clone());
    }

    fn retract(&mut self, value: &Value) -> Result<(), WindowError> {
        if value.is_nullish() {
            return Ok(());
        }
        let Some(bucket) = self.values.get_mut(value) else {
            return Ok(());
        };
        match bucket.iter().position(|held| held.is_identical(value)) {
            Some(pos) => {
                bucket.remove(pos);
            }
            None => {
                bucket.pop_front();
            }
        }
        if bucket.is_empty() {
            self.values.remove(value);
        }
        Ok(())
    }

    fn supports_retract(&self) -> bool {
        true
    }

    fn evaluate(&self) -> Value {
        let bucket = match self.sense {
            Sense::Min => self.values.values().next(),
            Sense::Max => self.values.values().next_back(),
        };
        bucket
            .and_then(|held| held.front())
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}
