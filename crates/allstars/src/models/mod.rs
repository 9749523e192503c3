pub mod adaboost;
pub mod discriminant;
pub mod estimator;
pub mod factory;
pub mod forest;
pub mod gbdt;
pub mod linalg;
pub mod linear;
pub mod mlp;
pub mod neighbors;
pub mod svm;
pub mod tree;

pub use estimator::Estimator;
pub use factory::{build_estimator, Family, ModelParams};
