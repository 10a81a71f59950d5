//! Peer connection for the call.
//!
//! Handles RTCPeerConnection lifecycle and its event listeners.

pub mod api;
pub mod connection;
pub mod observer;

pub use api::*;
pub use connection::*;
pub use observer::*;
