//! Display surfaces streams get attached to.
//!
//! Surfaces are passed to the initiator explicitly; nothing looks them up
//! by name at runtime.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Description of a stream received from the remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMediaStream {
    pub stream_id: String,
    pub track_id: String,
    /// "video" or "audio"
    pub kind: String,
    pub mime_type: String,
}

/// Anything that can be shown on a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaStreamHandle {
    Local {
        stream_id: String,
        track_ids: Vec<String>,
    },
    Remote(RemoteMediaStream),
}

impl MediaStreamHandle {
    pub fn stream_id(&self) -> &str {
        match self {
            MediaStreamHandle::Local { stream_id, .. } => stream_id,
            MediaStreamHandle::Remote(remote) => &remote.stream_id,
        }
    }
}

/// Attachment point for a stream (a video element, a window, a sink)
pub trait DisplaySurface: Send + Sync {
    /// Replace whatever the surface currently shows with `stream`.
    fn attach(&self, stream: MediaStreamHandle);
}

/// Surface that remembers the last attached stream
pub struct SurfaceSlot {
    name: String,
    current: Mutex<Option<MediaStreamHandle>>,
    attach_count: AtomicU64,
}

impl SurfaceSlot {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            current: Mutex::new(None),
            attach_count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currently attached stream, if any
    pub fn current(&self) -> Option<MediaStreamHandle> {
        self.current.lock().clone()
    }

    pub fn attach_count(&self) -> u64 {
        self.attach_count.load(Ordering::Relaxed)
    }
}

impl DisplaySurface for SurfaceSlot {
    fn attach(&self, stream: MediaStreamHandle) {
        log::info!("[{}] showing stream {}", self.name, stream.stream_id());
        *self.current.lock() = Some(stream);
        self.attach_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: &str) -> MediaStreamHandle {
        MediaStreamHandle::Remote(RemoteMediaStream {
            stream_id: id.to_string(),
            track_id: "video".to_string(),
            kind: "video".to_string(),
            mime_type: "video/H264".to_string(),
        })
    }

    #[test]
    fn test_slot_starts_empty() {
        let slot = SurfaceSlot::new("remoteVideo");
        assert_eq!(slot.name(), "remoteVideo");
        assert!(slot.current().is_none());
        assert_eq!(slot.attach_count(), 0);
    }

    #[test]
    fn test_attach_replaces_previous_stream() {
        let slot = SurfaceSlot::new("remoteVideo");
        slot.attach(remote("a"));
        slot.attach(remote("b"));

        assert_eq!(slot.attach_count(), 2);
        assert_eq!(slot.current().unwrap().stream_id(), "b");
    }
}
