pub mod normalize;
pub mod orchestrator;
