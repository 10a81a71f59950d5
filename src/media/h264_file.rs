//! H.264 file source: Annex-B file -> local video track.
//!
//! Every acquisition gets its own TX thread that reads NAL units from the
//! file and writes them to that stream's track at a fixed frame rate, looping
//! at end of file. Writes before the connection is up are dropped by the
//! track, so the pump starts as soon as the stream is acquired. A pump ends
//! when its track is released (every stream and connection holding it is
//! gone) or on `stop`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use webrtc::media::io::h264_reader::H264Reader;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::source::{
    check_video_only, h264_capability, next_stream_id, CaptureError, LocalMediaStream,
    MediaConstraints, MediaSource,
};

/// Reader buffer capacity for NAL parsing
const READER_CAPACITY: usize = 1_048_576;

/// File source statistics
#[derive(Default)]
pub struct FileSourceStats {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub write_errors: AtomicU64,
    pub loops: AtomicU64,
}

impl FileSourceStats {
    fn snapshot(&self) -> FileSourceStatsSnapshot {
        FileSourceStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            loops: self.loops.load(Ordering::Relaxed),
        }
    }
}

/// Statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct FileSourceStatsSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub write_errors: u64,
    pub loops: u64,
}

/// One TX thread feeding one acquired stream
struct Pump {
    stream_id: String,
    running: Arc<AtomicBool>,
    stats: Arc<FileSourceStats>,
}

/// Media source backed by an Annex-B H.264 file
pub struct H264FileSource {
    path: PathBuf,
    fps: u32,
    pumps: Mutex<Vec<Pump>>,
    /// Totals across every pump this source started
    pub stats: Arc<FileSourceStats>,
}

impl H264FileSource {
    /// # Arguments
    /// * `path` - Annex-B H.264 elementary stream
    /// * `fps` - Frame rate to pace NAL units at (clamped to at least 1)
    pub fn new(path: impl AsRef<Path>, fps: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fps: fps.max(1),
            pumps: Mutex::new(Vec::new()),
            stats: Arc::new(FileSourceStats::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if any TX thread is running
    pub fn is_running(&self) -> bool {
        self.active_streams() > 0
    }

    /// Number of streams currently being fed
    pub fn active_streams(&self) -> usize {
        self.pumps
            .lock()
            .iter()
            .filter(|p| p.running.load(Ordering::SeqCst))
            .count()
    }

    /// Signal every TX thread to stop. Threads exit after their current
    /// frame; this does not wait for them.
    pub fn stop(&self) {
        for pump in self.pumps.lock().drain(..) {
            pump.running.store(false, Ordering::SeqCst);
        }
    }

    /// Signal the TX thread feeding `stream_id` to stop.
    pub fn stop_stream(&self, stream_id: &str) {
        let mut pumps = self.pumps.lock();
        if let Some(pos) = pumps.iter().position(|p| p.stream_id == stream_id) {
            pumps.remove(pos).running.store(false, Ordering::SeqCst);
        }
    }

    /// Get statistics snapshot (all streams)
    pub fn get_stats(&self) -> FileSourceStatsSnapshot {
        self.stats.snapshot()
    }

    /// Statistics of the pump feeding `stream_id`, while it is known
    pub fn stream_stats(&self, stream_id: &str) -> Option<FileSourceStatsSnapshot> {
        self.pumps
            .lock()
            .iter()
            .find(|p| p.stream_id == stream_id)
            .map(|p| p.stats.snapshot())
    }

    fn open(&self) -> Result<File, CaptureError> {
        File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CaptureError::Unavailable(format!("{} not found", self.path.display()))
            }
            std::io::ErrorKind::PermissionDenied => {
                CaptureError::Denied(format!("{}: permission denied", self.path.display()))
            }
            _ => CaptureError::Io(e),
        })
    }

    fn start(
        &self,
        stream_id: &str,
        track: &Arc<TrackLocalStaticSample>,
    ) -> Result<(), CaptureError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CaptureError::Unavailable(format!("no async runtime: {}", e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let stream_stats = Arc::new(FileSourceStats::default());

        let path = self.path.clone();
        let frame_duration = Duration::from_millis(1000 / self.fps as u64);
        let track: Weak<TrackLocalStaticSample> = Arc::downgrade(track);
        let thread_running = running.clone();
        let totals = self.stats.clone();
        let stats = stream_stats.clone();

        thread::Builder::new()
            .name(format!("h264-file-tx-{}", stream_id))
            .spawn(move || {
                let mut next_tx = Instant::now();

                'file: while thread_running.load(Ordering::SeqCst) {
                    let file = match File::open(&path) {
                        Ok(f) => f,
                        Err(e) => {
                            log::error!("Failed to reopen {}: {}", path.display(), e);
                            break;
                        }
                    };
                    let mut reader = H264Reader::new(BufReader::new(file), READER_CAPACITY);
                    let mut frames_this_pass = 0u64;

                    while thread_running.load(Ordering::SeqCst) {
                        let nal = match reader.next_nal() {
                            Ok(nal) => nal,
                            // End of file (or a truncated tail): start over
                            Err(_) => break,
                        };

                        let now = Instant::now();
                        if next_tx > now {
                            thread::sleep(next_tx - now);
                        }

                        // Stream released: nobody can receive these frames anymore
                        let Some(track) = track.upgrade() else {
                            break 'file;
                        };

                        let data = nal.data.freeze();
                        let len = data.len() as u64;
                        let sample = Sample {
                            data,
                            duration: frame_duration,
                            ..Default::default()
                        };

                        match runtime.block_on(track.write_sample(&sample)) {
                            Ok(()) => {
                                for s in [&stats, &totals] {
                                    s.frames_sent.fetch_add(1, Ordering::Relaxed);
                                    s.bytes_sent.fetch_add(len, Ordering::Relaxed);
                                }
                            }
                            Err(_) => {
                                for s in [&stats, &totals] {
                                    s.write_errors.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        frames_this_pass += 1;

                        next_tx += frame_duration;
                        if Instant::now() > next_tx + frame_duration {
                            next_tx = Instant::now() + frame_duration;
                        }
                    }

                    if frames_this_pass == 0 {
                        log::warn!("{} contains no H.264 NAL units", path.display());
                        break;
                    }
                    for s in [&stats, &totals] {
                        s.loops.fetch_add(1, Ordering::Relaxed);
                    }
                }

                thread_running.store(false, Ordering::SeqCst);
            })?;

        let mut pumps = self.pumps.lock();
        pumps.retain(|p| p.running.load(Ordering::SeqCst));
        pumps.push(Pump {
            stream_id: stream_id.to_string(),
            running,
            stats: stream_stats,
        });
        Ok(())
    }
}

#[async_trait]
impl MediaSource for H264FileSource {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalMediaStream, CaptureError> {
        check_video_only(constraints)?;

        // Fail early on a missing or unreadable file
        drop(self.open()?);

        let stream_id = next_stream_id("file");
        let track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            "video".to_owned(),
            stream_id.clone(),
        ));

        self.start(&stream_id, &track)?;
        log::info!(
            "Streaming {} at {} fps into {}",
            self.path.display(),
            self.fps,
            stream_id
        );

        Ok(LocalMediaStream::new(stream_id, vec![track]))
    }
}

impl Drop for H264FileSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}", std::process::id(), name))
    }

    /// Three tiny NAL units (SPS-ish, PPS-ish, IDR-ish) with start codes
    pub(crate) fn write_h264_fixture(name: &str) -> PathBuf {
        let path = temp_path(name);
        let bytes: Vec<u8> = [
            &[0, 0, 0, 1, 0x67, 0x42, 0xe0, 0x1f][..],
            &[0, 0, 0, 1, 0x68, 0xce, 0x38, 0x80][..],
            &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00][..],
        ]
        .concat();
        std::fs::write(&path, &bytes).unwrap();
        path
    }

    fn attempts(stats: &FileSourceStatsSnapshot) -> u64 {
        stats.frames_sent + stats.write_errors
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let source = H264FileSource::new(temp_path("does-not-exist.h264"), 30);
        let err = source
            .acquire(&MediaConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Unavailable(_)));
        assert!(!source.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pumps_nal_units() {
        let path = write_h264_fixture("pump.h264");

        let source = H264FileSource::new(&path, 100);
        let stream = source.acquire(&MediaConstraints::default()).await.unwrap();
        assert_eq!(stream.track_count(), 1);
        assert!(source.is_running());

        tokio::time::sleep(Duration::from_millis(200)).await;
        source.stop();

        assert!(!source.is_running());
        assert!(attempts(&source.get_stats()) >= 3);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_acquire_keeps_first_stream_fed() {
        let path = write_h264_fixture("two-streams.h264");
        let source = H264FileSource::new(&path, 100);

        let first = source.acquire(&MediaConstraints::default()).await.unwrap();
        let second = source.acquire(&MediaConstraints::default()).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(source.active_streams(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let first_before = attempts(&source.stream_stats(first.id()).unwrap());
        let second_before = attempts(&source.stream_stats(second.id()).unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let first_after = attempts(&source.stream_stats(first.id()).unwrap());
        let second_after = attempts(&source.stream_stats(second.id()).unwrap());

        assert!(first_after > first_before);
        assert!(second_after > second_before);

        source.stop_stream(first.id());
        assert_eq!(source.active_streams(), 1);
        assert!(source.stream_stats(first.id()).is_none());

        source.stop();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_released_stream_ends_its_pump() {
        let path = write_h264_fixture("released.h264");
        let source = H264FileSource::new(&path, 100);

        let stream = source.acquire(&MediaConstraints::default()).await.unwrap();
        assert_eq!(source.active_streams(), 1);

        drop(stream);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(source.active_streams(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_fps_clamped() {
        let source = H264FileSource::new("x.h264", 0);
        assert_eq!(source.fps, 1);
    }
}
