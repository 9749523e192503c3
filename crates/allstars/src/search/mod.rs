//! Hyperparameter search: the trial/study engine, the per-family search space
//! and the two objectives that drive it.

pub mod candidate;
pub mod catalog;
pub mod objective;
pub mod registry;
pub mod stacking;
pub mod study;
pub mod trial;

pub use candidate::CandidateModel;
pub use catalog::{Catalog, ParameterAssignment};
pub use objective::{FamilySummary, Objective, LOW_SCORE_SENTINEL};
pub use registry::{BestModelRegistry, GlobalBest};
pub use stacking::{StackedModel, StackingObjective};
pub use study::{Direction, FrozenTrial, ObjectiveFunction, Study};
pub use trial::{Distribution, FixedTrial, ParameterValue, SampledTrial, Trial};
