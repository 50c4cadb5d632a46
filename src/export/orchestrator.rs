use crate::composition::model::Timeline;
use crate::composition::store::PreparedAssetStore;
use crate::export::encoder::VideoEncoder;
use crate::foundation::core::MICROS_PER_SECOND;
use crate::foundation::error::{VidloomError, VidloomResult};
use crate::mux::sink::WriteSink;
use crate::mux::webm::WebmMuxer;
use crate::render::compositor::composite_frame;
use crate::render::surface::Surface;

/// Queue depth above which the export loop stops rendering and blocks on the
/// encoder until it catches up.
pub const BACKPRESSURE_THRESHOLD: usize = 30;

/// A keyframe is requested every this many frames, starting at frame 0.
pub const KEYFRAME_INTERVAL: u64 = 150;

/// The window and raster parameters of one export run.
///
/// `start_time_us` shifts the rendered window along the timeline without
/// shifting the output: frame `i` composites the timeline at
/// `start_time_us + i · frame_length` and the muxer re-anchors the first
/// chunk at time zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    pub start_time_us: u64,
    pub total_length_us: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl ExportConfig {
    /// Full-timeline export: window `[0, duration_us)` at the timeline's
    /// canvas size and frame rate.
    pub fn from_timeline(timeline: &Timeline) -> Self {
        Self {
            start_time_us: 0,
            total_length_us: timeline.duration_us,
            width: timeline.canvas.width,
            height: timeline.canvas.height,
            fps: timeline.fps,
        }
    }

    /// Restrict the export to the window `[start_time_us, start_time_us +
    /// total_length_us)`.
    pub fn with_window(mut self, start_time_us: u64, total_length_us: u64) -> Self {
        self.start_time_us = start_time_us;
        self.total_length_us = total_length_us;
        self
    }

    pub fn validate(&self) -> VidloomResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VidloomError::validation(
                "export width/height must be > 0",
            ));
        }
        if self.fps == 0 {
            return Err(VidloomError::validation("export fps must be > 0"));
        }
        if self.total_length_us == 0 {
            return Err(VidloomError::validation(
                "export total_length_us must be > 0",
            ));
        }
        Ok(())
    }
}

/// Counters reported when an export completes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExportStats {
    pub frames_rendered: u64,
    pub chunks_muxed: u64,
    pub clusters_written: u64,
    pub duration_ms: f64,
}

/// Called after every rendered second and at the end, with
/// `(frames_done, total_frames)`.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

/// Render the configured timeline window frame by frame, feed the encoder,
/// and stream encoded chunks into the muxer as they become available.
///
/// The loop never lets the encoder queue grow past
/// [`BACKPRESSURE_THRESHOLD`]: once it does, rendering pauses and the loop
/// drains the encoder, forwarding each drained chunk. The muxer is finalized
/// before returning.
#[tracing::instrument(
    skip_all,
    fields(fps = cfg.fps, start_us = cfg.start_time_us, length_us = cfg.total_length_us)
)]
pub fn export<E: VideoEncoder, S: WriteSink>(
    cfg: &ExportConfig,
    timeline: &Timeline,
    store: &PreparedAssetStore,
    encoder: &mut E,
    muxer: &mut WebmMuxer<S>,
    mut progress: Option<ProgressFn<'_>>,
) -> VidloomResult<ExportStats> {
    cfg.validate()?;
    timeline.validate()?;

    let total_frames =
        (u128::from(cfg.fps) * u128::from(cfg.total_length_us) / u128::from(MICROS_PER_SECOND))
            as u64;
    if total_frames == 0 {
        return Err(VidloomError::validation(
            "export window is too short to produce a single frame",
        ));
    }
    let frame_length_us = cfg.total_length_us / total_frames;

    let mut surface = Surface::new(cfg.width, cfg.height)?;
    let mut chunks_muxed = 0u64;

    for frame_index in 0..total_frames {
        let t_us = cfg.start_time_us + frame_index * frame_length_us;
        composite_frame(&mut surface, &timeline.clips, store, t_us)?;

        let keyframe = frame_index % KEYFRAME_INTERVAL == 0;
        encoder.submit(&surface, t_us, frame_length_us, keyframe)?;
        chunks_muxed += forward_chunks(encoder, muxer)?;

        while encoder.pending() > BACKPRESSURE_THRESHOLD {
            encoder.wait_drain()?;
            chunks_muxed += forward_chunks(encoder, muxer)?;
        }

        let done = frame_index + 1;
        if done % u64::from(cfg.fps) == 0 || done == total_frames {
            tracing::info!(frames = done, total = total_frames, "export progress");
            if let Some(cb) = progress.as_deref_mut() {
                cb(done, total_frames);
            }
        }
    }

    encoder.flush()?;
    chunks_muxed += forward_chunks(encoder, muxer)?;
    muxer.finalize()?;

    let stats = ExportStats {
        frames_rendered: total_frames,
        chunks_muxed,
        clusters_written: muxer.clusters_written(),
        duration_ms: muxer.duration_ms(),
    };
    tracing::info!(
        frames = stats.frames_rendered,
        chunks = stats.chunks_muxed,
        clusters = stats.clusters_written,
        "export complete"
    );
    Ok(stats)
}

fn forward_chunks<E: VideoEncoder, S: WriteSink>(
    encoder: &mut E,
    muxer: &mut WebmMuxer<S>,
) -> VidloomResult<u64> {
    let chunks = encoder.poll_chunks();
    let count = chunks.len() as u64;
    for chunk in chunks {
        muxer.add_chunk(chunk)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::model::{AssetSource, Clip, ClipProps};
    use crate::composition::store::{PreparedAsset, PreparedImage};
    use crate::export::encoder::{EncoderConfig, InMemoryEncoder};
    use crate::foundation::core::Canvas;
    use crate::mux::sink::InMemorySink;
    use crate::mux::webm::{MuxState, MuxerConfig};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn timeline(duration_us: u64) -> Timeline {
        Timeline {
            canvas: Canvas::new(16, 16).unwrap(),
            fps: 30,
            duration_us,
            assets: BTreeMap::new(),
            clips: Vec::new(),
        }
    }

    fn pipeline(width: u32, height: u32) -> (InMemoryEncoder, WebmMuxer<InMemorySink>) {
        let encoder = InMemoryEncoder::new(EncoderConfig::new("vp8", width, height)).unwrap();
        let muxer = WebmMuxer::new(MuxerConfig::new("V_VP8", width, height), InMemorySink::new())
            .unwrap();
        (encoder, muxer)
    }

    fn run(
        tl: &Timeline,
        store: &PreparedAssetStore,
        encoder: &mut InMemoryEncoder,
        muxer: &mut WebmMuxer<InMemorySink>,
    ) -> VidloomResult<ExportStats> {
        export(
            &ExportConfig::from_timeline(tl),
            tl,
            store,
            encoder,
            muxer,
            None,
        )
    }

    #[test]
    fn one_second_export_yields_one_cluster() {
        let (mut encoder, mut muxer) = pipeline(16, 16);
        let stats = run(
            &timeline(1_000_000),
            &PreparedAssetStore::new(),
            &mut encoder,
            &mut muxer,
        )
        .unwrap();
        assert_eq!(stats.frames_rendered, 30);
        assert_eq!(stats.chunks_muxed, 30);
        assert_eq!(stats.clusters_written, 1);
        assert_eq!(muxer.state(), MuxState::Finalized);
    }

    #[test]
    fn encoder_queue_never_exceeds_threshold_plus_one() {
        let (mut encoder, mut muxer) = pipeline(16, 16);
        // A drain batch of 1 keeps the queue pinned at the threshold.
        encoder = encoder.with_drain_batch(1);
        run(
            &timeline(3_000_000),
            &PreparedAssetStore::new(),
            &mut encoder,
            &mut muxer,
        )
        .unwrap();
        assert!(
            encoder.max_pending_seen() <= BACKPRESSURE_THRESHOLD + 1,
            "high water {}",
            encoder.max_pending_seen()
        );
    }

    #[test]
    fn progress_reports_once_per_second_and_at_the_end() {
        let (mut encoder, mut muxer) = pipeline(16, 16);
        let mut reports: Vec<(u64, u64)> = Vec::new();
        let mut cb = |done: u64, total: u64| reports.push((done, total));
        let tl = timeline(2_500_000);
        export(
            &ExportConfig::from_timeline(&tl),
            &tl,
            &PreparedAssetStore::new(),
            &mut encoder,
            &mut muxer,
            Some(&mut cb),
        )
        .unwrap();
        assert_eq!(reports, vec![(30, 75), (60, 75), (75, 75)]);
    }

    #[test]
    fn zero_frame_window_is_rejected() {
        let (mut encoder, mut muxer) = pipeline(16, 16);
        let err = run(
            &timeline(10_000),
            &PreparedAssetStore::new(),
            &mut encoder,
            &mut muxer,
        )
        .unwrap_err();
        assert!(matches!(err, VidloomError::Validation(_)), "{err}");
    }

    #[test]
    fn window_start_offsets_every_composited_frame() {
        // One clip active only in [1s, 2s); the exported window covers
        // exactly that second, so its frames must all see the clip.
        let mut tl = timeline(3_000_000);
        tl.assets.insert(
            "white".to_string(),
            AssetSource::Image {
                source: "white.png".to_string(),
            },
        );
        tl.clips.push(Clip {
            id: "late".to_string(),
            asset: "white".to_string(),
            props: ClipProps {
                render_start_us: 1_000_000,
                render_length_us: 1_000_000,
                ..Default::default()
            },
        });
        let mut store = PreparedAssetStore::new();
        store.insert(
            "white",
            PreparedAsset::Image(PreparedImage {
                width: 1,
                height: 1,
                rgba8_premul: Arc::new(vec![255, 255, 255, 255]),
            }),
        );

        // White pixels only ever come from the clip; a run of eight 0xFF
        // bytes cannot occur in black frames or container framing.
        let has_white = |bytes: &[u8]| bytes.windows(8).any(|w| w == [255u8; 8]);

        let (mut encoder, mut muxer) = pipeline(16, 16);
        let cfg = ExportConfig::from_timeline(&tl).with_window(1_000_000, 1_000_000);
        let stats = export(&cfg, &tl, &store, &mut encoder, &mut muxer, None).unwrap();
        assert_eq!(stats.frames_rendered, 30);
        assert!(has_white(muxer.sink().bytes()), "clip missing from window");

        // The second before the clip starts must stay black.
        let (mut encoder, mut muxer) = pipeline(16, 16);
        let cfg = ExportConfig::from_timeline(&tl).with_window(0, 1_000_000);
        export(&cfg, &tl, &store, &mut encoder, &mut muxer, None).unwrap();
        assert!(!has_white(muxer.sink().bytes()), "clip leaked before start");
    }
}
