//! Attribute set identity for time series.
mod set;

pub use set::AttributeSet;
