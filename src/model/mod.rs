mod adapter;
mod store;
mod types;

pub use store::ModelStore;
pub use types::{GenerationResult, Readiness, SamplingParams};
