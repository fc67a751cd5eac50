pub mod common;
pub mod runtime;

pub use common::{Document, ErrorKind, Value, WindowError};
pub use runtime::expression::{parse_expression, Expression};
pub use runtime::operators::window::{
    AccumulationStrategy, SetWindowFieldsSpec, WindowOperator, WindowOperatorConfig,
    WindowOperatorSpec, WindowedDocuments,
};
