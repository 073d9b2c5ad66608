pub mod jobs;
pub mod ops;
