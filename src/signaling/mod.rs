//! Signaling for the offer/answer exchange.
//!
//! - Message: JSON wire types (`{offer, prompt}` request, description response)
//! - Client: single HTTP POST carrying the offer, answer in the response body
//! - Server: offer endpoint answering with an H.264 loopback connection

pub mod client;
pub mod message;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::*;
pub use message::*;
pub use server::*;
