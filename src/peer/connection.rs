//! The call's peer connection.
//!
//! Wraps RTCPeerConnection from webrtc-rs and tracks the caller-side
//! negotiation state: `NoLocalDescription -> LocalDescriptionSet ->
//! RemoteDescriptionSet`. A failed step leaves the state where the last
//! successful step put it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::observer::{CallObservers, IceCandidateInfo};
use crate::ice::{validate_servers, IceServerConfig};
use crate::media::{LocalMediaStream, RemoteMediaStream};
use crate::signaling::{SdpType, SessionDescription};

/// Negotiation failures
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Invalid ICE configuration: {0}")]
    IceConfig(String),

    #[error("Failed to create peer connection: {0}")]
    Create(#[source] webrtc::Error),

    #[error("Failed to add track: {0}")]
    AddTrack(#[source] webrtc::Error),

    #[error("Failed to create offer: {0}")]
    CreateOffer(#[source] webrtc::Error),

    #[error("Failed to set local description: {0}")]
    SetLocal(#[source] webrtc::Error),

    #[error("No local description available")]
    MissingLocal,

    #[error("Expected an answer, got {0}")]
    UnexpectedType(SdpType),

    #[error("Invalid remote description: {0}")]
    InvalidRemote(#[source] webrtc::Error),

    #[error("Failed to set remote description: {0}")]
    SetRemote(#[source] webrtc::Error),

    #[error("Failed to close peer connection: {0}")]
    Close(#[source] webrtc::Error),
}

/// Caller-side negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NegotiationState {
    NoLocalDescription = 0,
    LocalDescriptionSet = 1,
    RemoteDescriptionSet = 2,
}

impl NegotiationState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => NegotiationState::LocalDescriptionSet,
            2 => NegotiationState::RemoteDescriptionSet,
            _ => NegotiationState::NoLocalDescription,
        }
    }
}

/// One call attempt's connection
pub struct CallConnection {
    peer_connection: Arc<RTCPeerConnection>,
    state: AtomicU8,
    observers: CallObservers,
    gathering_complete: Arc<Notify>,
    gathered: Arc<AtomicBool>,
}

impl CallConnection {
    /// Create the connection and register its observers.
    ///
    /// # Arguments
    /// * `api` - webrtc-rs API (see [`crate::peer::build_api`])
    /// * `ice_servers` - Candidate-discovery services, must be non-empty
    /// * `observers` - Local candidate and remote track listeners
    pub async fn new(
        api: &API,
        ice_servers: &[IceServerConfig],
        observers: CallObservers,
    ) -> Result<Self, NegotiationError> {
        validate_servers(ice_servers).map_err(NegotiationError::IceConfig)?;

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(|s| s.to_rtc_ice_server()).collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(NegotiationError::Create)?,
        );

        // Local candidates: diagnostics only
        let candidate_observers = observers.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let observers = candidate_observers.clone();
            Box::pin(async move {
                if let Some(c) = candidate {
                    match c.to_json() {
                        Ok(init) => observers.on_local_candidate(IceCandidateInfo {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }),
                        Err(e) => log::warn!("Unserializable local candidate: {}", e),
                    }
                }
            })
        }));

        // Remote tracks go straight to the display surface
        let track_observers = observers.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                track_observers.on_remote_track(RemoteMediaStream {
                    stream_id: track.stream_id(),
                    track_id: track.id(),
                    kind: track.kind().to_string(),
                    mime_type: track.codec().capability.mime_type,
                });
                Box::pin(async {})
            },
        ));

        let gathering_complete = Arc::new(Notify::new());
        let gathered = Arc::new(AtomicBool::new(false));
        let notify = gathering_complete.clone();
        let gathered_flag = gathered.clone();
        peer_connection.on_ice_gathering_state_change(Box::new(move |state| {
            if state == RTCIceGathererState::Complete {
                gathered_flag.store(true, Ordering::SeqCst);
                notify.notify_one();
            }
            Box::pin(async {})
        }));

        Ok(Self {
            peer_connection,
            state: AtomicU8::new(NegotiationState::NoLocalDescription as u8),
            observers,
            gathering_complete,
            gathered,
        })
    }

    /// Bind every track of `stream`. Must happen before the offer is created
    /// so the offer carries the matching media sections.
    pub async fn add_stream(&self, stream: &LocalMediaStream) -> Result<(), NegotiationError> {
        for track in stream.tracks() {
            self.peer_connection
                .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(NegotiationError::AddTrack)?;
        }
        Ok(())
    }

    /// Create an offer and commit it as the local description.
    pub async fn create_and_set_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(NegotiationError::CreateOffer)?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(NegotiationError::SetLocal)?;

        self.set_state(NegotiationState::LocalDescriptionSet);

        self.local_description()
            .await
            .ok_or(NegotiationError::MissingLocal)
    }

    /// Wait for ICE gathering to finish, at most `timeout`.
    ///
    /// Returns whether gathering completed.
    pub async fn wait_for_gathering(&self, timeout: Duration) -> bool {
        if self.gathered.load(Ordering::SeqCst) {
            return true;
        }

        tokio::select! {
            _ = self.gathering_complete.notified() => true,
            _ = tokio::time::sleep(timeout) => self.gathered.load(Ordering::SeqCst),
        }
    }

    /// Commit the remote answer.
    pub async fn apply_answer(&self, answer: &SessionDescription) -> Result<(), NegotiationError> {
        if answer.sdp_type != SdpType::Answer {
            return Err(NegotiationError::UnexpectedType(answer.sdp_type));
        }

        let rtc_answer = answer.to_rtc().map_err(NegotiationError::InvalidRemote)?;

        self.peer_connection
            .set_remote_description(rtc_answer)
            .await
            .map_err(NegotiationError::SetRemote)?;

        self.set_state(NegotiationState::RemoteDescriptionSet);
        Ok(())
    }

    /// Local description, including any candidates gathered so far
    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .local_description()
            .await
            .and_then(|d| SessionDescription::from_rtc(&d))
    }

    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.peer_connection
            .remote_description()
            .await
            .and_then(|d| SessionDescription::from_rtc(&d))
    }

    pub fn state(&self) -> NegotiationState {
        NegotiationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn observers(&self) -> &CallObservers {
        &self.observers
    }

    /// Close the peer connection
    pub async fn close(&self) -> Result<(), NegotiationError> {
        self.peer_connection
            .close()
            .await
            .map_err(NegotiationError::Close)
    }

    /// Get the peer connection for advanced usage
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    fn set_state(&self, state: NegotiationState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}
