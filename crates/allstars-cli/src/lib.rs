pub mod cli;
pub mod fit;
