pub mod metrics;
pub mod predictor;
pub mod queue;
