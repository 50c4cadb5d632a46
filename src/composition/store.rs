use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::Context as _;

use crate::composition::model::{AssetSource, Timeline};
use crate::foundation::error::VidloomResult;

/// Prepared raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Row-major, tightly packed premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

/// Prepared image sequence played back at a fixed per-frame cadence.
#[derive(Clone, Debug)]
pub struct PreparedSequence {
    pub frames: Vec<PreparedImage>,
    pub frame_duration_us: u64,
}

impl PreparedSequence {
    /// Frame shown at clip-relative time `local_us`, or `None` for an empty
    /// sequence. Playback clamps to the last frame rather than wrapping.
    pub fn frame_at(&self, local_us: u64) -> Option<&PreparedImage> {
        if self.frames.is_empty() {
            return None;
        }
        let idx = if self.frame_duration_us == 0 {
            0
        } else {
            (local_us / self.frame_duration_us) as usize
        };
        Some(&self.frames[idx.min(self.frames.len() - 1)])
    }
}

/// A renderable asset: the capability set dispatched once per frame by the
/// compositor.
#[derive(Clone, Debug)]
pub enum PreparedAsset {
    Image(PreparedImage),
    ImageSequence(PreparedSequence),
}

/// Front-loaded asset storage: all decoding happens before the export loop,
/// so rendering performs no IO.
#[derive(Clone, Debug, Default)]
pub struct PreparedAssetStore {
    assets: BTreeMap<String, PreparedAsset>,
}

impl PreparedAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, asset: PreparedAsset) {
        self.assets.insert(key.into(), asset);
    }

    pub fn get(&self, key: &str) -> Option<&PreparedAsset> {
        self.assets.get(key)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Decode every asset a timeline references, resolving source paths
    /// against `root`.
    pub fn prepare_timeline(timeline: &Timeline, root: &Path) -> VidloomResult<Self> {
        let mut store = Self::new();
        for (key, source) in &timeline.assets {
            let asset = match source {
                AssetSource::Image { source } => {
                    PreparedAsset::Image(load_image(&root.join(source))?)
                }
                AssetSource::ImageSequence {
                    sources,
                    frame_duration_us,
                } => {
                    let mut frames = Vec::with_capacity(sources.len());
                    for source in sources {
                        frames.push(load_image(&root.join(source))?);
                    }
                    PreparedAsset::ImageSequence(PreparedSequence {
                        frames,
                        frame_duration_us: *frame_duration_us,
                    })
                }
            };
            store.insert(key.clone(), asset);
        }
        Ok(store)
    }
}

fn load_image(path: &Path) -> VidloomResult<PreparedImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read image '{}'", path.display()))?;
    decode_image(&bytes)
}

/// Decode encoded image bytes into a premultiplied RGBA8 [`PreparedImage`].
pub fn decode_image(bytes: &[u8]) -> VidloomResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}
