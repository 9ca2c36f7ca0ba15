//! Message feed clients.
//!
//! - [`HttpMessageFeed`] talks to the conversation backend over REST with
//!   a per-agent bearer credential.
//! - [`InMemoryFeed`] keeps everything in process, for tests and demos.

pub mod http;
pub mod memory;

pub use http::HttpMessageFeed;
pub use memory::{InMemoryFeed, Reaction};
