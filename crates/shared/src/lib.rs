//! Shared types for the classline real-time client: canonical models, push
//! event decoding, REST wire shapes, and error types.

pub mod error;
pub mod events;
pub mod models;

pub use error::*;
pub use events::*;
pub use models::*;
