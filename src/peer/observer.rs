//! Listener slots invoked by the peer connection.
//!
//! Both slots may fire at any time relative to the offer/answer sequence and
//! never touch state that sequence depends on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::media::{DisplaySurface, MediaStreamHandle, RemoteMediaStream};

/// ICE candidate discovered locally
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceCandidateInfo {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Extra consumer for local candidates (diagnostics)
pub type CandidateHook = Arc<dyn Fn(&IceCandidateInfo) + Send + Sync>;

/// Local candidate and remote track observers for one connection
#[derive(Clone)]
pub struct CallObservers {
    remote_surface: Arc<dyn DisplaySurface>,
    candidate_hook: Option<CandidateHook>,
    candidates_seen: Arc<AtomicU64>,
    tracks_seen: Arc<AtomicU64>,
}

impl CallObservers {
    pub fn new(remote_surface: Arc<dyn DisplaySurface>) -> Self {
        Self {
            remote_surface,
            candidate_hook: None,
            candidates_seen: Arc::new(AtomicU64::new(0)),
            tracks_seen: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_candidate_hook(mut self, hook: CandidateHook) -> Self {
        self.candidate_hook = Some(hook);
        self
    }

    /// Candidates are logged only; none are sent to the remote side.
    pub fn on_local_candidate(&self, candidate: IceCandidateInfo) {
        log::info!(
            "[Local Candidate] {} (mid={:?}, mline={:?})",
            candidate.candidate,
            candidate.sdp_mid,
            candidate.sdp_mline_index
        );
        self.candidates_seen.fetch_add(1, Ordering::Relaxed);

        if let Some(hook) = &self.candidate_hook {
            hook(&candidate);
        }
    }

    /// Attach the stream the track belongs to. No precondition on negotiation
    /// progress.
    pub fn on_remote_track(&self, stream: RemoteMediaStream) {
        log::info!(
            "[Track] {} {} ({}) in stream {}",
            stream.kind,
            stream.track_id,
            stream.mime_type,
            stream.stream_id
        );
        self.tracks_seen.fetch_add(1, Ordering::Relaxed);
        self.remote_surface.attach(MediaStreamHandle::Remote(stream));
    }

    pub fn candidates_seen(&self) -> u64 {
        self.candidates_seen.load(Ordering::Relaxed)
    }

    pub fn tracks_seen(&self) -> u64 {
        self.tracks_seen.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SurfaceSlot;
    use parking_lot::Mutex;

    #[test]
    fn test_candidate_hook_sees_every_candidate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let observers = CallObservers::new(Arc::new(SurfaceSlot::new("remote")))
            .with_candidate_hook(Arc::new(move |c: &IceCandidateInfo| {
                seen_clone.lock().push(c.candidate.clone());
            }));

        for port in [50000, 50001] {
            observers.on_local_candidate(IceCandidateInfo {
                candidate: format!("candidate:1 1 udp 2130706431 127.0.0.1 {} typ host", port),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            });
        }

        assert_eq!(observers.candidates_seen(), 2);
        assert_eq!(seen.lock().len(), 2);
        assert!(seen.lock()[1].contains("50001"));
    }

    #[test]
    fn test_remote_track_attaches_stream() {
        let surface = Arc::new(SurfaceSlot::new("remoteVideo"));
        let observers = CallObservers::new(surface.clone());

        let stream = RemoteMediaStream {
            stream_id: "echo".to_string(),
            track_id: "video".to_string(),
            kind: "video".to_string(),
            mime_type: "video/H264".to_string(),
        };
        observers.on_remote_track(stream.clone());

        assert_eq!(observers.tracks_seen(), 1);
        assert_eq!(surface.current(), Some(MediaStreamHandle::Remote(stream)));
    }
}
