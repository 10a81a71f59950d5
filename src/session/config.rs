//! Session configuration.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::ice::{google_stun_servers, validate_servers, IceServerConfig};
use crate::media::MediaConstraints;
use crate::signaling::default_prompt;

/// Offer endpoint of a locally running answer server
pub const DEFAULT_SIGNALING_URL: &str = "http://127.0.0.1:8888/offer";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid signaling URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid ICE servers: {0}")]
    IceServers(String),
}

/// When the offer leaves relative to candidate gathering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGathering {
    /// Send the offer as soon as it is committed. Candidates gathered later
    /// are only reported to the observers, never signaled.
    Trickle,
    /// Wait for gathering to finish (or `timeout`) so the offer carries
    /// every candidate.
    Complete { timeout: Duration },
}

/// Everything the initiator needs besides its collaborators
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub signaling_url: String,
    pub ice_servers: Vec<IceServerConfig>,
    pub constraints: MediaConstraints,
    /// Opaque auxiliary payload sent next to the offer
    pub prompt: Value,
    pub gathering: IceGathering,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            ice_servers: google_stun_servers(),
            constraints: MediaConstraints::default(),
            prompt: default_prompt(),
            gathering: IceGathering::Trickle,
        }
    }
}

impl SessionConfig {
    pub fn with_signaling_url(mut self, url: &str) -> Self {
        self.signaling_url = url.to_string();
        self
    }

    pub fn with_ice_servers(mut self, servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn with_prompt(mut self, prompt: Value) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_gathering(mut self, gathering: IceGathering) -> Self {
        self.gathering = gathering;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.signaling_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.signaling_url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl {
                url: self.signaling_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        validate_servers(&self.ice_servers).map_err(ConfigError::IceServers)
    }
}
