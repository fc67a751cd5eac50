pub mod config;

pub use config::{SetWindowFieldsSpec, SortKeyPart, WindowFunctionConfig, WindowOperatorConfig};
