pub mod document;
pub mod error;
pub mod value;

pub use document::Document;
pub use error::{ErrorKind, WindowError};
pub use value::Value;
