//! JSON signaling messages exchanged with the offer endpoint.
//!
//! Request:  `{"offer": {"sdp": "...", "type": "offer"}, "prompt": {...}}`
//! Response: `{"sdp": "...", "type": "answer"}`

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Which side of the offer/answer exchange a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// Session description as it travels over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }

    /// Convert from a webrtc-rs description. Only offers and answers map;
    /// pranswer/rollback never appear in this exchange.
    pub fn from_rtc(desc: &RTCSessionDescription) -> Option<Self> {
        let sdp_type = match desc.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            _ => return None,
        };
        Some(Self {
            sdp: desc.sdp.clone(),
            sdp_type,
        })
    }

    /// Convert to a webrtc-rs description (parses the SDP payload).
    pub fn to_rtc(&self) -> Result<RTCSessionDescription, webrtc::Error> {
        match self.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(self.sdp.clone()),
            SdpType::Answer => RTCSessionDescription::answer(self.sdp.clone()),
        }
    }
}

/// Body of the signaling POST.
///
/// Fields are private so the only way to build one is [`OfferRequest::new`],
/// which always tags the description as an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRequest {
    offer: SessionDescription,
    prompt: Value,
}

impl OfferRequest {
    pub fn new(offer_sdp: impl Into<String>, prompt: Value) -> Self {
        Self {
            offer: SessionDescription::offer(offer_sdp),
            prompt,
        }
    }

    pub fn offer(&self) -> &SessionDescription {
        &self.offer
    }

    /// Opaque auxiliary payload, passed through untouched
    pub fn prompt(&self) -> &Value {
        &self.prompt
    }
}

/// Keyed task description sent alongside the offer by default
pub fn default_prompt() -> Value {
    json!({
        "1": { "inputs": { "image": "sampled_frame.jpg" } },
        "2": { "inputs": { "images": ["12", 0] } }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_request_serialize() {
        let req = OfferRequest::new("v=0\r\n", default_prompt());
        let value: Value = serde_json::to_value(&req).unwrap();

        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(value["offer"]["type"], "offer");
        assert_eq!(value["offer"]["sdp"], "v=0\r\n");
        assert_eq!(value["prompt"]["1"]["inputs"]["image"], "sampled_frame.jpg");
        assert_eq!(value["prompt"]["2"]["inputs"]["images"], json!(["12", 0]));
    }

    #[test]
    fn test_answer_deserialize() {
        let json = r#"{"sdp":"v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n","type":"answer"}"#;
        let desc: SessionDescription = serde_json::from_str(json).unwrap();
        assert_eq!(desc.sdp_type, SdpType::Answer);
        assert!(desc.sdp.starts_with("v=0"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"sdp":"v=0\r\n","type":"pranswer"}"#;
        assert!(serde_json::from_str::<SessionDescription>(json).is_err());

        let missing = r#"{"sdp":"v=0\r\n"}"#;
        assert!(serde_json::from_str::<SessionDescription>(missing).is_err());
    }

    #[test]
    fn test_prompt_passes_through_unchanged() {
        let prompt = json!({"task": [1, 2, {"nested": null}]});
        let req = OfferRequest::new("v=0\r\n", prompt.clone());
        let text = serde_json::to_string(&req).unwrap();
        let back: OfferRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.prompt(), &prompt);
        assert_eq!(back.offer().sdp_type, SdpType::Offer);
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(SdpType::Offer.to_string(), "offer");
        assert_eq!(SdpType::Answer.to_string(), "answer");
    }
}
