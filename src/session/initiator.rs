//! Session initiator - the caller side of a single call.
//!
//! Flow:
//! 1. Create the peer connection with candidate-discovery servers
//! 2. Register the local candidate and remote track observers
//! 3. Acquire local media, show it on the local surface, add its tracks
//! 4. Create an offer and commit it as local description
//! 5. POST `{offer, prompt}` to the signaling endpoint and await the answer
//! 6. Commit the answer as remote description
//!
//! No step is retried and nothing is rolled back; the first failure ends the
//! attempt and goes to the caller's handler.

use std::sync::Arc;

use thiserror::Error;
use webrtc::api::API;

use super::config::{ConfigError, IceGathering, SessionConfig};
use crate::media::{CaptureError, DisplaySurface, LocalMediaStream, MediaSource};
use crate::peer::{build_api, CallConnection, CallObservers, NegotiationError};
use crate::signaling::{OfferRequest, SessionDescription, SignalingClient, SignalingError};

/// Any failure of a call attempt
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

/// What a completed negotiation produced
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub local_stream: LocalMediaStream,
    pub offer: SessionDescription,
    pub answer: SessionDescription,
}

/// A negotiated call
pub struct CallSession {
    connection: CallConnection,
    negotiated: Negotiated,
}

impl CallSession {
    pub fn connection(&self) -> &CallConnection {
        &self.connection
    }

    pub fn local_stream(&self) -> &LocalMediaStream {
        &self.negotiated.local_stream
    }

    /// Offer as it was sent
    pub fn offer(&self) -> &SessionDescription {
        &self.negotiated.offer
    }

    /// Answer as it was received
    pub fn answer(&self) -> &SessionDescription {
        &self.negotiated.answer
    }

    /// Hang up
    pub async fn close(&self) -> Result<(), NegotiationError> {
        self.connection.close().await
    }
}

/// Starts calls against one signaling endpoint
pub struct SessionInitiator {
    config: SessionConfig,
    api: API,
    signaling: SignalingClient,
    media_source: Arc<dyn MediaSource>,
    local_surface: Arc<dyn DisplaySurface>,
    remote_surface: Arc<dyn DisplaySurface>,
}

impl SessionInitiator {
    /// # Arguments
    /// * `config` - Endpoint, ICE servers, constraints and prompt
    /// * `media_source` - Where local media comes from
    /// * `local_surface` - Shows the local stream
    /// * `remote_surface` - Shows whatever the remote peer sends
    pub fn new(
        config: SessionConfig,
        media_source: Arc<dyn MediaSource>,
        local_surface: Arc<dyn DisplaySurface>,
        remote_surface: Arc<dyn DisplaySurface>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let api = build_api().map_err(NegotiationError::Create)?;
        let signaling = SignalingClient::new(&config.signaling_url)?;

        Ok(Self {
            config,
            api,
            signaling,
            media_source,
            local_surface,
            remote_surface,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Steps 1-2: a fresh connection with both observers registered.
    pub async fn new_connection(&self) -> Result<CallConnection, SessionError> {
        let observers = CallObservers::new(self.remote_surface.clone());
        let connection =
            CallConnection::new(&self.api, &self.config.ice_servers, observers).await?;
        Ok(connection)
    }

    /// Run the whole sequence on a new connection.
    pub async fn start_session(&self) -> Result<CallSession, SessionError> {
        let connection = self.new_connection().await?;

        match self.negotiate(&connection).await {
            Ok(negotiated) => Ok(CallSession {
                connection,
                negotiated,
            }),
            Err(e) => {
                // The attempt is over; release its transports
                if let Err(close_err) = connection.close().await {
                    log::debug!("Closing failed connection: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Steps 3-6 against an existing connection.
    pub async fn negotiate(&self, connection: &CallConnection) -> Result<Negotiated, SessionError> {
        let local_stream = self.media_source.acquire(&self.config.constraints).await?;
        self.local_surface.attach(local_stream.handle());
        connection.add_stream(&local_stream).await?;

        connection.create_and_set_offer().await?;

        if let IceGathering::Complete { timeout } = self.config.gathering {
            if !connection.wait_for_gathering(timeout).await {
                log::warn!("ICE gathering incomplete after {:?}, sending offer anyway", timeout);
            }
        }

        let offer = connection
            .local_description()
            .await
            .ok_or(NegotiationError::MissingLocal)?;
        log::debug!("SDP Offer: {}", offer.sdp);

        let request = OfferRequest::new(offer.sdp.clone(), self.config.prompt.clone());
        let answer = self.signaling.post_offer(&request).await?;

        connection.apply_answer(&answer).await?;
        log::info!("[Remote Description] {} applied", answer.sdp_type);
        log::debug!("SDP Answer: {}", answer.sdp);

        Ok(Negotiated {
            local_stream,
            offer,
            answer,
        })
    }
}

/// Top-level entry: run one attempt, hand any failure to `handler`.
pub async fn run_session<F>(initiator: &SessionInitiator, handler: F) -> Option<CallSession>
where
    F: FnOnce(SessionError),
{
    match initiator.start_session().await {
        Ok(session) => Some(session),
        Err(e) => {
            handler(e);
            None
        }
    }
}

/// Default handler: log and give up.
pub fn log_and_drop(err: SessionError) {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    log::error!("Call attempt failed: {}", message);
}
