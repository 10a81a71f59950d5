//! webrtc-offer-call - single WebRTC video call over an HTTP offer/answer exchange
//!
//! The initiator captures a local stream, creates an SDP offer, POSTs it
//! together with an opaque prompt payload to a signaling endpoint, and applies
//! the returned answer.
//!
//! Features:
//! - Session initiator with a pluggable media source and display surfaces
//! - JSON signaling client (HTTP and HTTPS endpoints)
//! - Answering endpoint that loops the caller's H.264 video back
//! - Local ICE candidate and remote track observers
//!
//! Failures at any step propagate to a single top-level handler.

pub mod ice;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use ice::{google_stun_servers, stun_server, turn_server, IceServerConfig};
pub use media::{
    BlankVideoSource, CaptureError, DisplaySurface, H264FileSource, LocalMediaStream,
    MediaConstraints, MediaSource, MediaStreamHandle, RemoteMediaStream, SurfaceSlot,
};
pub use peer::{
    build_api, build_h264_api, CallConnection, CallObservers, IceCandidateInfo, NegotiationError,
    NegotiationState,
};
pub use session::{
    log_and_drop, run_session, CallSession, ConfigError, IceGathering, SessionConfig,
    SessionError, SessionInitiator,
};
pub use signaling::{
    default_prompt, EndpointError, OfferEndpoint, OfferEndpointConfig, OfferRequest, SdpType,
    SessionDescription, SignalingClient, SignalingError,
};
