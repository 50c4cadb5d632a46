use std::collections::BTreeMap;

use crate::foundation::core::Canvas;
use crate::foundation::error::{VidloomError, VidloomResult};

/// Placement and timing of one clip within the export timeline.
///
/// `pos_*` values are conceptually in `[0, 1]` of the output canvas but are
/// left unclamped by design: off-canvas and oversized placements are valid.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ClipProps {
    /// Timeline start, µs.
    pub render_start_us: u64,
    /// Active duration, µs; must be > 0.
    pub render_length_us: u64,
    pub pos_left: f64,
    pub pos_top: f64,
    pub pos_width: f64,
    pub pos_height: f64,
    /// Rotation in radians, applied about the placement origin.
    pub rotation_rad: f64,
}

impl Default for ClipProps {
    fn default() -> Self {
        Self {
            render_start_us: 0,
            render_length_us: 1,
            pos_left: 0.0,
            pos_top: 0.0,
            pos_width: 1.0,
            pos_height: 1.0,
            rotation_rad: 0.0,
        }
    }
}

/// One timed visual layer. Owned by the export session for the duration of
/// one render, never shared across concurrent renders.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Clip {
    pub id: String,
    /// Key into the prepared asset store.
    pub asset: String,
    pub props: ClipProps,
}

impl Clip {
    /// Whether this clip is active at absolute time `t_us`:
    /// `render_start ≤ t < render_start + render_length`.
    pub fn is_active_at(&self, t_us: u64) -> bool {
        let start = self.props.render_start_us;
        t_us >= start && t_us < start.saturating_add(self.props.render_length_us)
    }

    /// Clip-relative time for a timestamp inside the active window.
    pub fn local_time_us(&self, t_us: u64) -> u64 {
        t_us.saturating_sub(self.props.render_start_us)
    }

    pub fn validate(&self) -> VidloomResult<()> {
        if self.id.trim().is_empty() {
            return Err(VidloomError::validation("clip id must be non-empty"));
        }
        if self.asset.trim().is_empty() {
            return Err(VidloomError::validation(format!(
                "clip '{}' must reference an asset key",
                self.id
            )));
        }
        if self.props.render_length_us == 0 {
            return Err(VidloomError::validation(format!(
                "clip '{}' must have render_length_us > 0",
                self.id
            )));
        }
        Ok(())
    }
}

/// Where an asset's pixels come from, as described in timeline JSON.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetSource {
    /// A single still image file.
    Image { source: String },
    /// An ordered set of image files played back at a fixed cadence.
    ImageSequence {
        sources: Vec<String>,
        frame_duration_us: u64,
    },
}

/// The CLI/JSON surface of an export: canvas, timing, assets, and clips.
///
/// Clips are drawn in list order; later clips paint over earlier ones.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Timeline {
    pub canvas: Canvas,
    pub fps: u32,
    pub duration_us: u64,
    pub assets: BTreeMap<String, AssetSource>,
    pub clips: Vec<Clip>,
}

impl Timeline {
    pub fn validate(&self) -> VidloomResult<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(VidloomError::validation("canvas width/height must be > 0"));
        }
        if self.fps == 0 {
            return Err(VidloomError::validation("fps must be > 0"));
        }
        if self.duration_us == 0 {
            return Err(VidloomError::validation("duration_us must be > 0"));
        }
        for clip in &self.clips {
            clip.validate()?;
            if !self.assets.contains_key(&clip.asset) {
                return Err(VidloomError::validation(format!(
                    "clip '{}' references missing asset key '{}'",
                    clip.id, clip.asset
                )));
            }
        }
        Ok(())
    }
}
