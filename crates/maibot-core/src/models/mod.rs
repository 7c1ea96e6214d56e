//! Data models shared by the store, network and deployment layers.

mod github;
mod instance;

pub use github::*;
pub use instance::*;
