pub mod client;
pub mod imager;
pub mod prompts;
pub mod storage;

pub use client::*;
pub use imager::*;
pub use storage::*;
