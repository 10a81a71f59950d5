//! Call Example
//!
//! Starts one video call against an offer endpoint and keeps it up until
//! Ctrl+C.
//!
//! Usage:
//!   cargo run --release --example call -- [offer_url] [--h264 <file>] [--wait-gathering]
//!
//! Examples:
//!   # Negotiation only, against the local answer_server example
//!   cargo run --release --example call
//!
//!   # Stream an Annex-B H.264 file
//!   cargo run --release --example call -- http://127.0.0.1:8888/offer --h264 sample.h264

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use webrtc_offer_call::session::DEFAULT_SIGNALING_URL;
use webrtc_offer_call::{
    log_and_drop, run_session, BlankVideoSource, H264FileSource, IceGathering, MediaSource,
    SessionConfig, SessionInitiator, SurfaceSlot,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let offer_url = if args.len() > 1 && !args[1].starts_with("--") {
        args[1].clone()
    } else {
        DEFAULT_SIGNALING_URL.to_string()
    };
    let h264_file = args
        .iter()
        .position(|a| a == "--h264")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let wait_gathering = args.iter().any(|a| a == "--wait-gathering");

    println!("========================================");
    println!("  WebRTC Offer Call");
    println!("========================================");
    println!();
    println!("Offer URL:     {}", offer_url);
    println!("Media:         {}", h264_file.as_deref().unwrap_or("(blank video track)"));
    println!("ICE gathering: {}", if wait_gathering { "complete" } else { "trickle" });
    println!();

    let mut config = SessionConfig::default().with_signaling_url(&offer_url);
    if wait_gathering {
        config = config.with_gathering(IceGathering::Complete {
            timeout: Duration::from_secs(5),
        });
    }

    let file_source = h264_file.map(|path| Arc::new(H264FileSource::new(path, 30)));
    let source: Arc<dyn MediaSource> = match &file_source {
        Some(s) => s.clone(),
        None => Arc::new(BlankVideoSource::new()),
    };

    let local_video = Arc::new(SurfaceSlot::new("localVideo"));
    let remote_video = Arc::new(SurfaceSlot::new("remoteVideo"));

    let initiator = SessionInitiator::new(config, source, local_video, remote_video.clone())
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    let session = match run_session(&initiator, log_and_drop).await {
        Some(session) => session,
        None => std::process::exit(1),
    };

    println!("[OK] Negotiated. Press Ctrl+C to hang up.");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, hanging up...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let frames = file_source
            .as_ref()
            .map(|s| s.get_stats().frames_sent)
            .unwrap_or(0);
        println!(
            "State: {} | Candidates: {} | Remote tracks: {} | Frames sent: {}",
            session.connection().peer_connection().connection_state(),
            session.connection().observers().candidates_seen(),
            remote_video.attach_count(),
            frames
        );
    }

    if let Some(source) = &file_source {
        source.stop();
    }
    session
        .close()
        .await
        .map_err(|e| format!("Close error: {}", e))?;
    println!("[OK] Call closed");

    Ok(())
}
