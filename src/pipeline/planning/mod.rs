pub mod json;
pub mod planner;
pub mod presets;
pub mod prompts;
pub mod summary;

pub use json::*;
pub use planner::*;
pub use presets::*;
pub use summary::*;
