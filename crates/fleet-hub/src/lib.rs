//! Control-plane broadcast hub
//!
//! The hub accepts WebSocket connections from workers, registers each under
//! the name it sends in its handshake, and fans every message out to all
//! other registered connections.

pub mod error;
pub mod hub;
pub mod registry;

pub use error::HubError;
pub use hub::Hub;
pub use registry::{Registry, RegistryHandle};
