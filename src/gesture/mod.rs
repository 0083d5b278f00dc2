pub mod classifier;
pub mod distance;
pub mod history;
pub mod labels;
pub mod preprocess;
pub mod smoother;
pub mod state_machine;
