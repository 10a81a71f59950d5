//! ICE (Interactive Connectivity Establishment) configuration.
//!
//! Provides helpers for configuring STUN and TURN servers.

use webrtc::ice_transport::ice_server::RTCIceServer;

/// Public STUN service used when nothing else is configured
pub const GOOGLE_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// ICE server configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// Create a STUN-only server config
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Create a TURN server config with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }

    /// Convert to webrtc-rs RTCIceServer
    pub fn to_rtc_ice_server(&self) -> RTCIceServer {
        RTCIceServer {
            urls: self.urls.clone(),
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Default Google STUN server
pub fn google_stun_servers() -> Vec<IceServerConfig> {
    vec![IceServerConfig::stun(GOOGLE_STUN_URL)]
}

/// Create a STUN server config
pub fn stun_server(url: &str) -> IceServerConfig {
    IceServerConfig::stun(url)
}

/// Create a TURN server config with credentials
pub fn turn_server(url: &str, username: &str, credential: &str) -> IceServerConfig {
    IceServerConfig::turn(url, username, credential)
}

/// Check a server list is usable: at least one server, none without URLs.
pub fn validate_servers(servers: &[IceServerConfig]) -> Result<(), String> {
    if servers.is_empty() {
        return Err("at least one ICE server is required".to_string());
    }
    if let Some(pos) = servers.iter().position(|s| s.urls.is_empty()) {
        return Err(format!("ICE server #{} has no URLs", pos));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_default() {
        let servers = google_stun_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec![GOOGLE_STUN_URL.to_string()]);
        assert!(servers[0].username.is_none());
    }

    #[test]
    fn test_turn_credentials_carried_over() {
        let rtc = turn_server("turn:turn.example.org:3478", "alice", "secret").to_rtc_ice_server();
        assert_eq!(rtc.urls, vec!["turn:turn.example.org:3478".to_string()]);
        assert_eq!(rtc.username, "alice");
        assert_eq!(rtc.credential, "secret");
    }

    #[test]
    fn test_validate_servers() {
        assert!(validate_servers(&[]).is_err());
        assert!(validate_servers(&google_stun_servers()).is_ok());

        let empty_urls = IceServerConfig {
            urls: vec![],
            username: None,
            credential: None,
        };
        let err = validate_servers(&[stun_server("stun:a:1"), empty_urls]).unwrap_err();
        assert!(err.contains("#1"));
    }
}
