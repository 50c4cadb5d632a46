//! Vidloom is a streaming video export engine.
//!
//! It renders a clip timeline frame by frame, drives a video encoder with
//! bounded in-flight depth, and muxes the encoded chunks incrementally into
//! a seekable WebM file. The public API is pipeline-oriented:
//!
//! - Load and validate a [`Timeline`]
//! - Prepare its assets into a [`PreparedAssetStore`]
//! - Run [`export`] with a [`VideoEncoder`] and a [`WebmMuxer`]
#![forbid(unsafe_code)]

/// Clip and timeline model plus the prepared asset store.
pub mod composition;
/// Low-level EBML serialization: variable-width integers, the element tree,
/// and size back-patching.
pub mod ebml;
/// Encoder interface and the export orchestration loop.
pub mod export;
/// Shared primitives: geometry re-exports, time units, errors.
pub mod foundation;
/// WebM/Matroska container writing.
pub mod mux;
/// Software compositor and its drawing surface.
pub mod render;

pub use crate::composition::model::{AssetSource, Clip, ClipProps, Timeline};
pub use crate::composition::store::{
    PreparedAsset, PreparedAssetStore, PreparedImage, PreparedSequence,
};
pub use crate::ebml::element::{EbmlData, EbmlElement, EbmlNode, write_element, write_node};
pub use crate::ebml::stream::{MAX_VINT_VALUE, StreamBuffer, measure_uint, measure_vint};
pub use crate::export::encoder::{EncodedChunk, EncoderConfig, InMemoryEncoder, VideoEncoder};
pub use crate::export::orchestrator::{
    BACKPRESSURE_THRESHOLD, ExportConfig, ExportStats, KEYFRAME_INTERVAL, ProgressFn, export,
};
pub use crate::foundation::core::{Affine, Canvas, Point, Rect, Vec2};
pub use crate::foundation::error::{VidloomError, VidloomResult};
pub use crate::mux::sink::{FileSink, InMemorySink, WriteSink};
pub use crate::mux::webm::{
    MAX_CLUSTER_DURATION_MS, MuxState, MuxedFrame, MuxerConfig, WebmMuxer, simple_block,
};
pub use crate::render::compositor::{composite_frame, needs_render, render_clip};
pub use crate::render::surface::Surface;
