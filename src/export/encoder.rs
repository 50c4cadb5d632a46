use std::collections::VecDeque;

use crate::foundation::error::{VidloomError, VidloomResult};
use crate::render::surface::Surface;

/// One encoded frame as produced by a video encoder.
///
/// Immutable once created; consumed exactly once by the muxer.
#[derive(Clone, Debug)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    /// Presentation timestamp, µs.
    pub timestamp_us: u64,
    pub duration_us: u64,
    pub keyframe: bool,
}

/// Requested encoder configuration.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EncoderConfig {
    /// Codec name as used in the WebM codec id, e.g. `"vp8"` or `"vp9"`.
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second, if the encoder supports it.
    pub bitrate: Option<u32>,
}

impl EncoderConfig {
    pub fn new(codec: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            codec: codec.into(),
            width,
            height,
            bitrate: None,
        }
    }

    /// Matroska codec id (`V_<CODEC>`) for this configuration.
    pub fn codec_id(&self) -> String {
        format!("V_{}", self.codec.to_ascii_uppercase())
    }

    pub fn validate(&self) -> VidloomResult<()> {
        if self.codec.trim().is_empty() {
            return Err(VidloomError::unsupported("codec must be non-empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(VidloomError::unsupported(format!(
                "resolution {}x{} is not encodable",
                self.width, self.height
            )));
        }
        if self.bitrate == Some(0) {
            return Err(VidloomError::unsupported("bitrate must be > 0 when set"));
        }
        Ok(())
    }
}

/// The narrow interface the orchestrator drives a hardware encoder through.
///
/// Frames are submitted in strictly increasing timestamp order and chunks are
/// emitted in submission order. `pending` is the outstanding-request counter;
/// `wait_drain` cooperatively blocks until at least one outstanding request
/// has completed.
pub trait VideoEncoder {
    /// Submit one composited frame for encoding.
    fn submit(
        &mut self,
        frame: &Surface,
        timestamp_us: u64,
        duration_us: u64,
        keyframe: bool,
    ) -> VidloomResult<()>;

    /// Number of submitted frames not yet delivered as chunks.
    fn pending(&self) -> usize;

    /// Block until the outstanding-request count decreases.
    fn wait_drain(&mut self) -> VidloomResult<()>;

    /// Take every chunk that has completed since the last poll, in
    /// submission order.
    fn poll_chunks(&mut self) -> Vec<EncodedChunk>;

    /// Deliver all outstanding frames as chunks.
    fn flush(&mut self) -> VidloomResult<()>;
}

struct PendingFrame {
    data: Vec<u8>,
    timestamp_us: u64,
    duration_us: u64,
    keyframe: bool,
}

/// Deterministic in-memory encoder for tests and the CLI demo.
///
/// Submissions queue up until `wait_drain`/`flush` completes them in order;
/// each completed frame becomes one chunk whose payload is the raw frame
/// bytes. The keyframe hint is honored verbatim.
pub struct InMemoryEncoder {
    cfg: EncoderConfig,
    queue: VecDeque<PendingFrame>,
    ready: Vec<EncodedChunk>,
    drain_batch: usize,
    max_pending_seen: usize,
}

impl InMemoryEncoder {
    pub fn new(cfg: EncoderConfig) -> VidloomResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            queue: VecDeque::new(),
            ready: Vec::new(),
            drain_batch: 8,
            max_pending_seen: 0,
        })
    }

    /// Number of frames completed per `wait_drain` call.
    pub fn with_drain_batch(mut self, drain_batch: usize) -> Self {
        self.drain_batch = drain_batch.max(1);
        self
    }

    /// Highest outstanding-request count ever observed. Test hook for
    /// backpressure assertions.
    pub fn max_pending_seen(&self) -> usize {
        self.max_pending_seen
    }

    fn complete(&mut self, count: usize) {
        for _ in 0..count {
            let Some(frame) = self.queue.pop_front() else {
                return;
            };
            self.ready.push(EncodedChunk {
                data: frame.data,
                timestamp_us: frame.timestamp_us,
                duration_us: frame.duration_us,
                keyframe: frame.keyframe,
            });
        }
    }
}

impl VideoEncoder for InMemoryEncoder {
    fn submit(
        &mut self,
        frame: &Surface,
        timestamp_us: u64,
        duration_us: u64,
        keyframe: bool,
    ) -> VidloomResult<()> {
        if frame.width() != self.cfg.width || frame.height() != self.cfg.height {
            return Err(VidloomError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.cfg.width,
                self.cfg.height
            )));
        }
        self.queue.push_back(PendingFrame {
            data: frame.data().to_vec(),
            timestamp_us,
            duration_us,
            keyframe,
        });
        self.max_pending_seen = self.max_pending_seen.max(self.queue.len());
        Ok(())
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn wait_drain(&mut self) -> VidloomResult<()> {
        self.complete(self.drain_batch);
        Ok(())
    }

    fn poll_chunks(&mut self) -> Vec<EncodedChunk> {
        std::mem::take(&mut self.ready)
    }

    fn flush(&mut self) -> VidloomResult<()> {
        let all = self.queue.len();
        self.complete(all);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_rejects_bad_combinations() {
        assert!(EncoderConfig::new("", 10, 10).validate().is_err());
        assert!(EncoderConfig::new("vp8", 0, 10).validate().is_err());
        assert!(EncoderConfig::new("vp8", 10, 0).validate().is_err());
        let mut cfg = EncoderConfig::new("vp8", 10, 10);
        cfg.bitrate = Some(0);
        assert!(cfg.validate().is_err());
        assert!(EncoderConfig::new("vp8", 10, 10).validate().is_ok());
    }

    #[test]
    fn codec_id_is_upper_cased_with_prefix() {
        assert_eq!(EncoderConfig::new("vp9", 8, 8).codec_id(), "V_VP9");
    }

    #[test]
    fn chunks_come_out_in_submission_order() {
        let mut enc = InMemoryEncoder::new(EncoderConfig::new("vp8", 2, 2)).unwrap();
        let frame = Surface::new(2, 2).unwrap();
        enc.submit(&frame, 0, 100, true).unwrap();
        enc.submit(&frame, 100, 100, false).unwrap();
        assert_eq!(enc.pending(), 2);
        assert!(enc.poll_chunks().is_empty());

        enc.flush().unwrap();
        let chunks = enc.poll_chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].timestamp_us, 0);
        assert!(chunks[0].keyframe);
        assert_eq!(chunks[1].timestamp_us, 100);
        assert!(!chunks[1].keyframe);
        assert_eq!(enc.pending(), 0);
    }

    #[test]
    fn wait_drain_completes_a_batch() {
        let mut enc = InMemoryEncoder::new(EncoderConfig::new("vp8", 1, 1))
            .unwrap()
            .with_drain_batch(2);
        let frame = Surface::new(1, 1).unwrap();
        for i in 0..5 {
            enc.submit(&frame, i * 10, 10, false).unwrap();
        }
        enc.wait_drain().unwrap();
        assert_eq!(enc.pending(), 3);
        assert_eq!(enc.poll_chunks().len(), 2);
    }

    #[test]
    fn submit_rejects_mismatched_frame_size() {
        let mut enc = InMemoryEncoder::new(EncoderConfig::new("vp8", 2, 2)).unwrap();
        let frame = Surface::new(3, 3).unwrap();
        assert!(enc.submit(&frame, 0, 10, false).is_err());
    }
}
