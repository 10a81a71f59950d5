//! Offer endpoint - the answering side of the exchange.
//!
//! Accepts `POST /offer` with `{offer, prompt}`, negotiates an H.264-only
//! peer connection that loops the caller's video back, and responds with the
//! answer as JSON.
//!
//! Routes:
//! - `POST /offer`    - offer in, answer out
//! - `OPTIONS /offer` - CORS preflight
//! - `GET /`          - health check

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};
use webrtc::api::API;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use super::message::{OfferRequest, SdpType, SessionDescription};
use crate::ice::IceServerConfig;
use crate::media::h264_capability;
use crate::peer::build_h264_api;

/// Offer endpoint configuration
#[derive(Clone, Debug)]
pub struct OfferEndpointConfig {
    /// Bind address (default 127.0.0.1)
    pub bind_addr: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Offer path (default "/offer")
    pub path: String,
    /// ICE servers for the answering connections (default none: host candidates only)
    pub ice_servers: Vec<IceServerConfig>,
    /// Upper bound on waiting for ICE gathering before answering
    pub gathering_timeout: Duration,
}

impl Default for OfferEndpointConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8888,
            path: "/offer".to_string(),
            ice_servers: Vec::new(),
            gathering_timeout: Duration::from_secs(5),
        }
    }
}

/// Errors starting the endpoint
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("Offer endpoint already running")]
    AlreadyRunning,

    #[error("Failed to build WebRTC API: {0}")]
    Api(#[source] webrtc::Error),
}

/// Answering connections whose caller has not gone away yet
type PeerList = Arc<Mutex<Vec<Arc<RTCPeerConnection>>>>;

/// State shared with every request handler
struct EndpointShared {
    api: API,
    path: String,
    ice_servers: Vec<IceServerConfig>,
    gathering_timeout: Duration,
    peers: PeerList,
}

/// HTTP endpoint answering offers
pub struct OfferEndpoint {
    config: OfferEndpointConfig,
    shared: Arc<EndpointShared>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl OfferEndpoint {
    /// Create a new offer endpoint
    pub fn new(config: OfferEndpointConfig) -> Result<Self, EndpointError> {
        let api = build_h264_api().map_err(EndpointError::Api)?;

        let shared = Arc::new(EndpointShared {
            api,
            path: config.path.clone(),
            ice_servers: config.ice_servers.clone(),
            gathering_timeout: config.gathering_timeout,
            peers: Arc::new(Mutex::new(Vec::new())),
        });

        Ok(Self {
            config,
            shared,
            shutdown_tx: None,
            local_addr: None,
        })
    }

    /// Start the HTTP server. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, EndpointError> {
        if self.shutdown_tx.is_some() {
            return Err(EndpointError::AlreadyRunning);
        }

        let addr: SocketAddr = format!("{}:{}", self.config.bind_addr, self.config.port)
            .parse()
            .map_err(|e| EndpointError::InvalidAddress(format!("{}", e)))?;

        let listener = TcpListener::bind(addr).await.map_err(EndpointError::Bind)?;
        let local_addr = listener.local_addr().map_err(EndpointError::Bind)?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let shared = self.shared.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let shared = shared.clone();

                                tokio::spawn(async move {
                                    let service = service_fn(move |req| {
                                        let shared = shared.clone();
                                        async move { handle_request(req, shared).await }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        log::warn!("Offer endpoint connection error: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                log::warn!("Offer endpoint accept error: {}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        log::info!("Offer endpoint listening on http://{}{}", local_addr, self.config.path);
        Ok(local_addr)
    }

    /// Address the server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Full URL of the offer route, once started
    pub fn offer_url(&self) -> Option<String> {
        self.local_addr
            .map(|addr| format!("http://{}{}", addr, self.config.path))
    }

    /// Number of answered connections whose caller is still there.
    ///
    /// A connection leaves the list once it reports disconnected, failed or
    /// closed.
    pub fn peer_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    /// Stop accepting requests and close every peer connection.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let peers: Vec<_> = self.shared.peers.lock().drain(..).collect();
        for pc in peers {
            if let Err(e) = pc.close().await {
                log::warn!("Failed to close peer connection: {}", e);
            }
        }
    }
}

/// Handle incoming HTTP request
async fn handle_request(
    req: Request<Incoming>,
    shared: Arc<EndpointShared>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if path == shared.path {
        return Ok(match method {
            Method::POST => handle_post_offer(req, shared).await,
            Method::OPTIONS => with_cors(respond(StatusCode::NO_CONTENT, None, Bytes::new())),
            _ => respond(
                StatusCode::METHOD_NOT_ALLOWED,
                Some("text/plain"),
                Bytes::from("Method Not Allowed"),
            ),
        });
    }

    Ok(match (method, path.as_str()) {
        (Method::GET, "/") => respond(StatusCode::OK, Some("text/plain"), Bytes::from("OK")),
        _ => respond(StatusCode::NOT_FOUND, Some("text/plain"), Bytes::from("Not Found")),
    })
}

/// Handle POST request - offer in, answer out
async fn handle_post_offer(
    req: Request<Incoming>,
    shared: Arc<EndpointShared>,
) -> Response<Full<Bytes>> {
    let body_bytes = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return bad_request(format!("Failed to read body: {}", e)),
    };

    let request: OfferRequest = match serde_json::from_slice(&body_bytes) {
        Ok(r) => r,
        Err(e) => return bad_request(format!("Invalid offer request: {}", e)),
    };

    if request.offer().sdp_type != SdpType::Offer {
        return bad_request(format!("Expected an offer, got {}", request.offer().sdp_type));
    }

    log::debug!("Offer prompt: {}", request.prompt());

    match answer_offer(&shared, request.offer()).await {
        Ok(answer) => {
            log::debug!("SDP Answer: {}", answer.sdp);
            match serde_json::to_vec(&answer) {
                Ok(body) => with_cors(respond(
                    StatusCode::OK,
                    Some("application/json"),
                    Bytes::from(body),
                )),
                Err(e) => server_error(format!("Failed to encode answer: {}", e)),
            }
        }
        Err(e) => server_error(e),
    }
}

/// Negotiate a loopback connection for `offer` and return the answer.
async fn answer_offer(
    shared: &EndpointShared,
    offer: &SessionDescription,
) -> Result<SessionDescription, String> {
    let rtc_offer = offer
        .to_rtc()
        .map_err(|e| format!("Invalid offer SDP: {}", e))?;

    let rtc_config = RTCConfiguration {
        ice_servers: shared
            .ice_servers
            .iter()
            .map(|s| s.to_rtc_ice_server())
            .collect(),
        ..Default::default()
    };

    let peer_connection = Arc::new(
        shared
            .api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| format!("Failed to create peer connection: {}", e))?,
    );

    release_on_hangup(&peer_connection, shared.peers.clone());

    match negotiate_loopback(&peer_connection, rtc_offer, shared.gathering_timeout).await {
        Ok(answer) => {
            if !is_gone(peer_connection.connection_state()) {
                shared.peers.lock().push(peer_connection);
            }
            Ok(answer)
        }
        Err(e) => {
            if let Err(close_err) = peer_connection.close().await {
                log::debug!("Closing failed answering connection: {}", close_err);
            }
            Err(e)
        }
    }
}

async fn negotiate_loopback(
    peer_connection: &Arc<RTCPeerConnection>,
    rtc_offer: RTCSessionDescription,
    gathering_timeout: Duration,
) -> Result<SessionDescription, String> {
    // Outgoing track carrying the caller's own video back
    let echo_track = Arc::new(TrackLocalStaticRTP::new(
        h264_capability(),
        "video".to_owned(),
        "echo".to_owned(),
    ));
    peer_connection
        .add_track(echo_track.clone() as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| format!("Failed to add echo track: {}", e))?;

    let echo = echo_track.clone();
    peer_connection.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            log::info!("Track received: {}", track.kind());
            if track.kind() == RTPCodecType::Video {
                tokio::spawn(spawn_loopback(track, echo.clone()));
            }
            Box::pin(async {})
        },
    ));

    let ice_complete = Arc::new(Notify::new());
    let ice_complete_clone = ice_complete.clone();
    peer_connection.on_ice_gathering_state_change(Box::new(move |state| {
        if state == RTCIceGathererState::Complete {
            ice_complete_clone.notify_one();
        }
        Box::pin(async {})
    }));

    peer_connection
        .set_remote_description(rtc_offer)
        .await
        .map_err(|e| format!("Failed to set remote description: {}", e))?;

    let answer = peer_connection
        .create_answer(None)
        .await
        .map_err(|e| format!("Failed to create answer: {}", e))?;

    peer_connection
        .set_local_description(answer)
        .await
        .map_err(|e| format!("Failed to set local description: {}", e))?;

    // Non-trickle: answer only once candidates are in the SDP
    tokio::select! {
        _ = ice_complete.notified() => {}
        _ = tokio::time::sleep(gathering_timeout) => {
            log::warn!("ICE gathering incomplete after {:?}, answering anyway", gathering_timeout);
        }
    }

    let local_desc = peer_connection
        .local_description()
        .await
        .ok_or("No local description available")?;

    SessionDescription::from_rtc(&local_desc)
        .ok_or_else(|| format!("Unexpected local description type {}", local_desc.sdp_type))
}

fn is_gone(state: RTCPeerConnectionState) -> bool {
    matches!(
        state,
        RTCPeerConnectionState::Disconnected
            | RTCPeerConnectionState::Failed
            | RTCPeerConnectionState::Closed
    )
}

/// Drop `peer_connection` from `peers` and close it once its caller is gone.
fn release_on_hangup(peer_connection: &Arc<RTCPeerConnection>, peers: PeerList) {
    let weak = Arc::downgrade(peer_connection);

    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            log::info!("Answering connection state: {}", state);

            if is_gone(state) {
                if let Some(pc) = weak.upgrade() {
                    let removed = {
                        let mut list = peers.lock();
                        let before = list.len();
                        list.retain(|p| !Arc::ptr_eq(p, &pc));
                        list.len() != before
                    };

                    // Closing re-enters this handler, so it runs on its own task
                    if removed && state != RTCPeerConnectionState::Closed {
                        tokio::spawn(async move {
                            if let Err(e) = pc.close().await {
                                log::debug!("Closing released answering connection: {}", e);
                            }
                        });
                    }
                }
            }
            Box::pin(async {})
        },
    ));
}

/// Forward every RTP packet of `track` to `echo` until the track ends.
async fn spawn_loopback(track: Arc<TrackRemote>, echo: Arc<TrackLocalStaticRTP>) {
    let mut forwarded = 0u64;

    loop {
        match track.read_rtp().await {
            Ok((rtp_packet, _attributes)) => {
                if let Err(e) = echo.write_rtp(&rtp_packet).await {
                    log::debug!("Echo write failed: {}", e);
                    break;
                }
                forwarded += 1;
            }
            Err(_) => break,
        }
    }

    log::info!("{} track ended after {} packets", track.kind(), forwarded);
}

fn respond(
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(ct) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(ct));
    }
    response
}

fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn bad_request(message: String) -> Response<Full<Bytes>> {
    log::warn!("Rejecting offer: {}", message);
    with_cors(respond(StatusCode::BAD_REQUEST, Some("text/plain"), Bytes::from(message)))
}

fn server_error(message: String) -> Response<Full<Bytes>> {
    log::error!("Failed to answer offer: {}", message);
    with_cors(respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        Some("text/plain"),
        Bytes::from(message),
    ))
}
