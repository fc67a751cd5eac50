use std::collections::HashMap;
use std::fmt;

use crate::common::{Value, WindowError};

pub mod min_max;
pub mod plain;
pub mod retractable;
pub mod stddev;
pub mod sum;


pub use plain::run_plain_accumulator;
pub use retractable::run_retractable_accumulator;

/// Per-window state of a window function.
///
/// `update` and `retract` take one input value at a time; `retract` undoes a
/// previous `update` of an equal value and is only valid when
/// `supports_retract` returns true.
pub trait Accumulator: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    fn update(&mut self, value: &Value);

    fn retract(&mut self, _value: &Value) -> Result<(), WindowError> {
        Err(WindowError::RetractNotSupported(self.name()))
    }

    fn supports_retract(&self) -> bool {
        false
    }

    /// Current result; the function's default when nothing has been added.
    fn evaluate(&self) -> Value;

    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorType {
    PlainAccumulator, // runs on the whole window, rebuilt per document
    RetractableAccumulator, // incremental updates and retracts as the window slides
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccumulatorKind {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    StdDevPop,
    StdDevSamp,
}

impl AccumulatorKind {
    pub fn name(self) -> &'static str {
        match self {
            AccumulatorKind::Sum => "$sum",
            AccumulatorKind::Avg => "$avg",
            AccumulatorKind::Count => "$count",
            AccumulatorKind::Min => "$min",
            AccumulatorKind::Max => "$max",
            AccumulatorKind::StdDevPop => "$stdDevPop",
            AccumulatorKind::StdDevSamp => "$stdDevSamp",
        }
    }

    pub fn aggregator_type(self) -> AggregatorType {
        match self {
            AccumulatorKind::StdDevPop | AccumulatorKind::StdDevSamp => {
                AggregatorType::PlainAccumulator
            }
            _ => AggregatorType::RetractableAccumulator,
        }
    }

    /// Whether the function reads its input expression at all.
    pub fn takes_input(self) -> bool {
        !matches!(self, AccumulatorKind::Count)
    }

    pub fn create_accumulator(self) -> Box<dyn Accumulator> {
        match self {
            AccumulatorKind::Sum => Box::new(sum::SumAccumulator::new()),
            AccumulatorKind::Avg => Box::new(sum::AvgAccumulator::new()),
            AccumulatorKind::Count => Box::new(sum::CountAccumulator::new()),
            AccumulatorKind::Min => Box::new(min_max::MinMaxAccumulator::min()),
            AccumulatorKind::Max => Box::new(min_max::MinMaxAccumulator::max()),
            AccumulatorKind::StdDevPop => Box::new(stddev::StdDevAccumulator::population()),
            AccumulatorKind::StdDevSamp => Box::new(stddev::StdDevAccumulator::sample()),
        }
    }
}

pub struct AggregateRegistry {
    kinds: HashMap<String, AccumulatorKind>,
}

impl Default for AggregateRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_supported_aggregates();
        registry
    }
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    fn register_supported_aggregates(&mut self) {
        self.register_aggregate(AccumulatorKind::Min);
        self.register_aggregate(AccumulatorKind::Max);

        self.register_aggregate(AccumulatorKind::Count);
        self.register_aggregate(AccumulatorKind::Sum);
        self.register_aggregate(AccumulatorKind::Avg);

        self.register_aggregate(AccumulatorKind::StdDevPop);
        self.register_aggregate(AccumulatorKind::StdDevSamp);
    }

    fn register_aggregate(&mut self, kind: AccumulatorKind) {
        self.kinds.insert(kind.name().to_string(), kind);
    }

    pub fn get_kind(&self, name: &str) -> Option<AccumulatorKind> {
        self.kinds.get(name).copied()
    }

    pub fn get_aggregator_type(&self, name: &str) -> Option<AggregatorType> {
        self.get_kind(name).map(AccumulatorKind::aggregator_type)
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn supported_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.keys().cloned().collect();
        names.sort();
        names
    }
}

pub fn get_aggregate_registry() -> &'static AggregateRegistry {
    static REGISTRY: std::sync::OnceLock<AggregateRegistry> = std::sync::OnceLock::new();
    REGISTRY.get_or_init(AggregateRegistry::default)
}
