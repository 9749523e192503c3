//! allstars: automated model selection over a catalog of classical estimators.
//!
//! This crate searches over estimator families (tree ensembles, boosting,
//! kernel machines, linear and neighbor models, shallow neural nets) and their
//! hyperparameters, keeps the best fitted model per family and overall, and
//! can combine the per-family champions into a stacked ensemble.
//!
//! Fits and whole trials run under wall-clock bounds; a timed-out or failed
//! trial scores [`search::LOW_SCORE_SENTINEL`] and the search moves on.
pub mod config;
pub mod data_handling;
pub mod driver;
pub mod error;
pub mod feature_selection;
pub mod io;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod report;
pub mod search;
pub mod timeout;

pub use error::{AllstarsError, Result};
