//! Session initiation: configuration and the offer/answer sequence.

pub mod config;
pub mod initiator;

pub use config::*;
pub use initiator::*;
