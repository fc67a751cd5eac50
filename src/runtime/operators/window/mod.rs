pub mod aggregates;
pub mod index;
pub mod shared;
pub mod window_operator;
pub mod window_tuning;


pub use aggregates::{AccumulatorKind, AggregatorType};
pub use index::{DocumentBound, RangeBound, TimeUnit, WindowBounds};
pub use shared::config::{SetWindowFieldsSpec, SortKeyPart, WindowFunctionConfig, WindowOperatorConfig};
pub use window_operator::{WindowOperator, WindowedDocuments};
pub use window_tuning::{AccumulationStrategy, WindowOperatorSpec};
