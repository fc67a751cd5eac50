pub mod expression;
pub mod operators;
pub mod partition;
