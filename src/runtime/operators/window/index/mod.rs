pub mod window_logic;

pub use window_logic::{
    range_sort_keys, resolve_document_window, resolve_range_window, DocumentBound, RangeBound,
    TimeUnit, WindowBounds, WindowRange,
};
