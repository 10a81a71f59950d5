//! webrtc-rs API construction (media engine + interceptors).

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecParameters, RTPCodecType};

use crate::media::h264_capability;

/// Payload type the H.264-only engine advertises
pub const H264_PAYLOAD_TYPE: u8 = 125;

/// API with every default codec registered (caller side).
pub fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    finish(media_engine)
}

/// API that can only negotiate H.264 video (answering side).
pub fn build_h264_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: h264_capability(),
            payload_type: H264_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;
    finish(media_engine)
}

fn finish(mut media_engine: MediaEngine) -> Result<API, webrtc::Error> {
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}
