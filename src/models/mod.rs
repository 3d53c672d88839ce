//! Domain records and the client-facing views built from them.

pub mod account;
pub mod enums;
pub mod presentation;
pub mod progress;
pub mod slide;

pub use account::*;
pub use enums::*;
pub use presentation::*;
pub use progress::*;
pub use slide::*;
