//! Feature selection utilities.
//!
//! Columns are chosen from the importances of the best random forest found
//! by a short, forest-only search.
pub mod importance;

pub use importance::{select_features, support_from_importances, FeatureSelection};
