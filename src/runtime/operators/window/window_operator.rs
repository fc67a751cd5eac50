use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::vec;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::common::{Document, Value, WindowError};
use crate::runtime::operators::window::aggregates::{
    run_plain_accumulator, run_retractable_accumulator, AggregatorType,
};
use crate::runtime::operators::window::index::{
    range_sort_keys, resolve_document_window, resolve_range_window, WindowBounds, WindowRange,
};
use crate::runtime::operators::window::shared::config::{
    SetWindowFieldsSpec, WindowFunctionConfig, WindowId, WindowOperatorConfig,
};
use crate::runtime::operators::window::window_tuning::{AccumulationStrategy, WindowOperatorSpec};
use crate::runtime::partition::{Partition, Partitioner};

#[derive(Debug, Clone)]
struct WindowConfig {
    function: WindowFunctionConfig,
    /// Effective strategy: never `Auto`, and `Incremental` only for retractable functions.
    strategy: AccumulationStrategy,
}

/// Evaluates the window functions of one `$setWindowFields` stage over a
/// stream of documents already ordered by (partition key, sort key).
#[derive(Debug, Clone)]
pub struct WindowOperator {
    config: Arc<WindowOperatorConfig>,
    windows: Arc<BTreeMap<WindowId, WindowConfig>>,
}

impl WindowOperator {
    pub fn new(config: WindowOperatorConfig) -> Self {
        let requested = config.tuning.strategy;
        let windows: BTreeMap<WindowId, WindowConfig> = config
            .windows
            .iter()
            .map(|function| {
                let strategy = effective_strategy(requested, function.kind.aggregator_type());
                if requested == AccumulationStrategy::Incremental && strategy != requested {
                    warn!(
                        field = %function.output_field,
                        function = function.kind.name(),
                        "function cannot retract, falling back to full recompute"
                    );
                }
                debug!(
                    window_id = function.window_id,
                    field = %function.output_field,
                    function = function.kind.name(),
                    ?strategy,
                    "configured window"
                );
                (
                    function.window_id,
                    WindowConfig {
                        function: function.clone(),
                        strategy,
                    },
                )
            })
            .collect();

        info!(
            windows = windows.len(),
            sort_keys = config.sort_by.len(),
            partitioned = config.partition_by.is_some(),
            strategy = ?requested,
            "created window operator"
        );

        Self {
            config: Arc::new(config),
            windows: Arc::new(windows),
        }
    }

    pub fn try_from_spec(
        spec: &SetWindowFieldsSpec,
        tuning: WindowOperatorSpec,
    ) -> Result<Self, WindowError> {
        let config = WindowOperatorConfig::try_from_spec(spec)?.with_tuning(tuning);
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &WindowOperatorConfig {
        &self.config
    }

    /// Lazily evaluates the stage over `input`, one partition at a time.
    pub fn execute<I>(&self, input: I) -> WindowedDocuments<I::IntoIter>
    where
        I: IntoIterator<Item = Document>,
    {
        let partitions = Partitioner::new(input.into_iter(), self.config.partition_by.clone())
            .with_max_partition_size(self.config.tuning.max_partition_size);
        WindowedDocuments {
            operator: self.clone(),
            partitions,
            state: EmitState::Buffering,
        }
    }

    /// Evaluates the whole input; on error no documents are returned.
    pub fn execute_all<I>(&self, input: I) -> Result<Vec<Document>, WindowError>
    where
        I: IntoIterator<Item = Document>,
    {
        self.execute(input).collect()
    }

    /// Computes every output field for one partition, in declaration order.
    pub fn process_partition(&self, partition: Partition) -> Result<Vec<Document>, WindowError> {
        let mut columns = Vec::with_capacity(self.windows.len());
        for window in self.windows.values() {
            columns.push(self.evaluate_window(window, &partition)?.into_iter());
        }

        let Partition { index, documents, .. } = partition;
        let output = documents
            .into_iter()
            .map(|mut doc| {
                for (window, column) in self.windows.values().zip(columns.iter_mut()) {
                    let value = column.next().unwrap_or(Value::Null);
                    doc.set(window.function.output_field.clone(), value);
                }
                doc
            })
            .collect_vec();
        debug!(partition = index, docs = output.len(), "evaluated partition");
        Ok(output)
    }

    fn evaluate_window(
        &self,
        window: &WindowConfig,
        partition: &Partition,
    ) -> Result<Vec<Value>, WindowError> {
        let function = &window.function;
        let inputs: Vec<Value> = if function.kind.takes_input() {
            partition
                .documents
                .iter()
                .map(|doc| function.input.evaluate(doc))
                .collect::<Result<_, _>>()?
        } else {
            vec![Value::Null; partition.len()]
        };
        let ranges = self.resolve_windows(function, partition)?;

        let mut accumulator = function.kind.create_accumulator();
        match window.strategy {
            AccumulationStrategy::Incremental => {
                run_retractable_accumulator(accumulator.as_mut(), &inputs, &ranges)
            }
            _ => Ok(run_plain_accumulator(accumulator.as_mut(), &inputs, &ranges)),
        }
    }

    fn resolve_windows(
        &self,
        function: &WindowFunctionConfig,
        partition: &Partition,
    ) -> Result<Vec<Option<WindowRange>>, WindowError> {
        let len = partition.len();
        match function.bounds {
            WindowBounds::Documents { lower, upper } => Ok((0..len)
                .map(|position| resolve_document_window(lower, upper, position, len))
                .collect()),
            WindowBounds::Range { lower, upper, unit } => {
                let Some(sort_key) = self.config.sort_by.first() else {
                    return Err(WindowError::InvalidSortBy(
                        "range-based windows require a sortBy field".to_string(),
                    ));
                };
                let values: Vec<Value> = partition
                    .documents
                    .iter()
                    .map(|doc| sort_key.expr.evaluate(doc))
                    .collect::<Result<_, _>>()?;
                let keys = range_sort_keys(
                    &values,
                    unit,
                    sort_key.descending,
                    &function.output_field,
                    partition.start_position,
                )?;
                let factor = unit.map_or(1.0, |u| u.millis() as f64);
                let (lower, upper) = (lower.scaled(factor), upper.scaled(factor));
                Ok((0..len)
                    .map(|position| resolve_range_window(&keys, lower, upper, position))
                    .collect())
            }
        }
    }
}

fn effective_strategy(
    requested: AccumulationStrategy,
    aggregator_type: AggregatorType,
) -> AccumulationStrategy {
    match (requested, aggregator_type) {
        (AccumulationStrategy::FullRecompute, _) | (_, AggregatorType::PlainAccumulator) => {
            AccumulationStrategy::FullRecompute
        }
        (_, AggregatorType::RetractableAccumulator) => AccumulationStrategy::Incremental,
    }
}

#[derive(Debug)]
enum EmitState {
    /// Waiting for the partitioner to hand out the next partition.
    Buffering,
    Emitting {
        partition: usize,
        docs: vec::IntoIter<Document>,
    },
    /// Partition drained; its buffer is released before buffering the next one.
    Done { partition: usize },
    /// Input exhausted.
    Finished,
    /// Stopped after an error.
    Failed,
}

/// Output stream of [`WindowOperator::execute`].
///
/// Holds at most one evaluated partition. After an error the stream ends.
#[derive(Debug)]
pub struct WindowedDocuments<I> {
    operator: WindowOperator,
    partitions: Partitioner<I>,
    state: EmitState,
}

impl<I> WindowedDocuments<I> {
    pub fn is_finished(&self) -> bool {
        matches!(self.state, EmitState::Finished | EmitState::Failed)
    }
}

impl<I> Iterator for WindowedDocuments<I>
where
    I: Iterator<Item = Document>,
{
    type Item = Result<Document, WindowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match mem::replace(&mut self.state, EmitState::Finished) {
                EmitState::Emitting { partition, mut docs } => {
                    if let Some(doc) = docs.next() {
                        self.state = EmitState::Emitting { partition, docs };
                        return Some(Ok(doc));
                    }
                    self.state = EmitState::Done { partition };
                }
                EmitState::Done { partition } => {
                    debug!(partition, "released partition");
                    self.state = EmitState::Buffering;
                }
                EmitState::Buffering => {
                    let evaluated = match self.partitions.next() {
                        None => return None,
                        Some(partition) => partition.and_then(|p| {
                            let index = p.index;
                            self.operator.process_partition(p).map(|docs| (index, docs))
                        }),
                    };
                    match evaluated {
                        Ok((partition, docs)) => {
                            self.state = EmitState::Emitting {
                                partition,
                                docs: docs.into_iter(),
                            };
                        }
                        Err(e) => {
                            warn!(error = %e, "window evaluation failed");
                            self.state = EmitState::Failed;
                            return Some(Err(e));
                        }
                    }
                }
                state @ (EmitState::Finished | EmitState::Failed) => {
                    self.state = state;
                    return None;
                }
            }
        }
    }
}
