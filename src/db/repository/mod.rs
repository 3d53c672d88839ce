//! Repository layer: entity-scoped database operations as free functions
//! over a borrowed `Connection`.

mod account;
mod codes;
mod presentation;
mod score;
mod slide;

pub use account::*;
pub use codes::*;
pub use presentation::*;
pub use score::*;
pub use slide::*;
