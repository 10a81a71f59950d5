//! Local media capture.
//!
//! A [`MediaSource`] stands in for camera access: given constraints it hands
//! back a [`LocalMediaStream`] whose tracks get bound to the connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::surface::MediaStreamHandle;

/// H.264 constrained baseline, packetization mode 1 (matches the
/// webrtc-rs default codec table)
pub const H264_FMTP: &str =
    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

/// Errors that can occur while acquiring local media
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Media capture denied: {0}")]
    Denied(String),

    #[error("Media device unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported constraints: {0}")]
    Unsupported(String),

    #[error("Media I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the caller asks the source for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: false,
        }
    }
}

/// Capture handle owning zero or more local tracks
#[derive(Clone)]
pub struct LocalMediaStream {
    id: String,
    tracks: Vec<Arc<TrackLocalStaticSample>>,
}

impl LocalMediaStream {
    pub fn new(id: String, tracks: Vec<Arc<TrackLocalStaticSample>>) -> Self {
        Self { id, tracks }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<TrackLocalStaticSample>] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Handle suitable for attaching to a display surface
    pub fn handle(&self) -> MediaStreamHandle {
        MediaStreamHandle::Local {
            stream_id: self.id.clone(),
            track_ids: self.tracks.iter().map(|t| t.id().to_string()).collect(),
        }
    }
}

impl std::fmt::Debug for LocalMediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Source of local media (camera, file, synthetic)
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints)
        -> Result<LocalMediaStream, CaptureError>;
}

/// Codec capability of every video track produced here
pub fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "video/H264".to_owned(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: H264_FMTP.to_owned(),
        rtcp_feedback: vec![],
    }
}

/// Unique stream id per acquisition so concurrent calls never share one
pub(crate) fn next_stream_id(prefix: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("{}-{}", prefix, NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Reject constraints a video-only source cannot satisfy
pub(crate) fn check_video_only(constraints: &MediaConstraints) -> Result<(), CaptureError> {
    if constraints.audio {
        return Err(CaptureError::Unsupported(
            "audio capture is not available from this source".to_string(),
        ));
    }
    if !constraints.video {
        return Err(CaptureError::Unsupported(
            "at least one of video or audio must be requested".to_string(),
        ));
    }
    Ok(())
}

/// Video source with a single track that never carries frames.
///
/// Enough to produce a video m-line in the offer.
#[derive(Debug, Default, Clone)]
pub struct BlankVideoSource;

impl BlankVideoSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for BlankVideoSource {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaStream, CaptureError> {
        check_video_only(constraints)?;

        let stream_id = next_stream_id("blank");
        let track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            "video".to_owned(),
            stream_id.clone(),
        ));

        Ok(LocalMediaStream::new(stream_id, vec![track]))
    }
}
