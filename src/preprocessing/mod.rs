//! Data preprocessing module
//!
//! Column-wise transforms applied to model inputs before fitting.

mod scaler;

pub use scaler::StandardScaler;
