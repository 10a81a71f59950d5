//! Answer Server Example
//!
//! Runs the offer endpoint: answers offers with an H.264-only connection that
//! loops the caller's video back.
//!
//! Usage:
//!   cargo run --release --example answer_server -- [bind_addr] [port]
//!
//! Example:
//!   cargo run --release --example answer_server -- 127.0.0.1 8888

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use webrtc_offer_call::{OfferEndpoint, OfferEndpointConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = OfferEndpointConfig::default();
    if let Some(bind_addr) = args.get(1) {
        config.bind_addr = bind_addr.clone();
    }
    if let Some(port) = args.get(2) {
        config.port = port
            .parse()
            .map_err(|e| format!("Invalid port '{}': {}", port, e))?;
    }

    let mut endpoint = OfferEndpoint::new(config)?;
    let addr = endpoint.start().await?;

    println!("Offer endpoint: http://{}/offer", addr);
    println!("Health check:   http://{}/", addr);
    println!("Press Ctrl+C to stop.");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let open = endpoint.peer_count();
    endpoint.stop().await;
    println!("[OK] Closed {} connection(s)", open);

    Ok(())
}
