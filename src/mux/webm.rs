use crate::ebml::element::{EbmlElement, EbmlNode, write_element};
use crate::ebml::stream::StreamBuffer;
use crate::export::encoder::EncodedChunk;
use crate::foundation::core::us_to_ms;
use crate::foundation::error::{VidloomError, VidloomResult};
use crate::mux::ids;
use crate::mux::sink::WriteSink;

/// Upper bound on one cluster's internal duration. A frame that would push
/// the open cluster to or past this bound starts a new cluster instead.
pub const MAX_CLUSTER_DURATION_MS: i64 = 5_000;

/// Matroska timestamp scale in ns per tick: 1_000_000 gives millisecond
/// block timecodes.
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;

const APP_NAME: &str = concat!("vidloom v", env!("CARGO_PKG_VERSION"));

const HEADER_CAPACITY: usize = 512;
const SEEK_HEAD_CAPACITY: usize = 128;
const DURATION_CAPACITY: usize = 16;
const PER_CUE_CAPACITY: usize = 48;
const PER_BLOCK_OVERHEAD: usize = 16;

/// Muxer lifecycle. Buffering and flushing both happen inside
/// `HeaderWritten`, as the cluster buffer's fill/drain cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuxState {
    Unwritten,
    HeaderWritten,
    Finalized,
}

/// Static muxer configuration: one video track, one codec.
#[derive(Clone, Debug)]
pub struct MuxerConfig {
    /// Matroska codec id string, `V_<CODEC>` form (e.g. `"V_VP8"`).
    pub codec_id: String,
    pub width: u32,
    pub height: u32,
    /// Track number written into every SimpleBlock; valid range 1..=126.
    pub track_number: u64,
}

impl MuxerConfig {
    pub fn new(codec_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            codec_id: codec_id.into(),
            width,
            height,
            track_number: 1,
        }
    }

    pub fn with_track_number(mut self, track_number: u64) -> Self {
        self.track_number = track_number;
        self
    }

    pub fn validate(&self) -> VidloomResult<()> {
        if self.codec_id.trim().is_empty() {
            return Err(VidloomError::validation("codec id must be non-empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(VidloomError::validation(
                "muxer width/height must be > 0",
            ));
        }
        Ok(())
    }
}

/// One frame as queued into the open cluster: timecode relative to the
/// cluster start, recomputed each time a frame is queued.
#[derive(Clone, Debug)]
pub struct MuxedFrame {
    pub track_number: u64,
    pub timecode_ms: i16,
    pub data: Vec<u8>,
    pub keyframe: bool,
}

/// Build the SimpleBlock element for one muxed frame: 1-byte track VINT,
/// 16-bit big-endian relative timecode, flags byte (bit 7 = keyframe), then
/// the raw frame bytes.
pub fn simple_block(frame: MuxedFrame) -> VidloomResult<EbmlElement> {
    if !(1..=126).contains(&frame.track_number) {
        return Err(VidloomError::validation(format!(
            "track number {} is outside the SimpleBlock range 1..=126",
            frame.track_number
        )));
    }
    let mut payload = Vec::with_capacity(frame.data.len() + 4);
    payload.push(0x80 | frame.track_number as u8);
    payload.extend_from_slice(&frame.timecode_ms.to_be_bytes());
    payload.push(if frame.keyframe { 0x80 } else { 0x00 });
    payload.extend_from_slice(&frame.data);
    Ok(EbmlElement::bytes(ids::SIMPLE_BLOCK, payload))
}

struct CueRecord {
    time_ms: u64,
    /// Cluster offset relative to the segment data start.
    cluster_pos: u64,
}

/// Incremental WebM muxer.
///
/// Owns the EBML document structure (header, unknown-size segment, clusters,
/// cues, seek head), buffers incoming encoded chunks into time-bounded
/// clusters, and finalizes the file by rewriting the reserved seek-head and
/// duration fields once all positions are known. The document grows
/// append-only except for those finalize-time patches and the element-size
/// back-patching inside [`write_element`].
pub struct WebmMuxer<S: WriteSink> {
    cfg: MuxerConfig,
    sink: S,
    state: MuxState,

    segment_data_offset: u64,
    seek_head_offset: u64,
    info_offset: u64,
    tracks_offset: u64,
    duration_offset: u64,
    cues_offset: u64,
    cues_written: bool,

    /// Wall-clock timestamp of the very first chunk; defines time zero.
    first_timestamp_us: Option<u64>,
    last_block_ms: f64,
    duration_ms: f64,

    cluster_frames: Vec<MuxedFrame>,
    cluster_start_ms: f64,
    clusters_written: u64,

    cues: Vec<CueRecord>,
}

impl<S: WriteSink> WebmMuxer<S> {
    pub fn new(cfg: MuxerConfig, sink: S) -> VidloomResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            sink,
            state: MuxState::Unwritten,
            segment_data_offset: 0,
            seek_head_offset: 0,
            info_offset: 0,
            tracks_offset: 0,
            duration_offset: 0,
            cues_offset: 0,
            cues_written: false,
            first_timestamp_us: None,
            last_block_ms: 0.0,
            duration_ms: 0.0,
            cluster_frames: Vec::new(),
            cluster_start_ms: 0.0,
            clusters_written: 0,
            cues: Vec::new(),
        })
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn clusters_written(&self) -> u64 {
        self.clusters_written
    }

    pub fn cue_count(&self) -> usize {
        self.cues.len()
    }

    /// Duration that finalize will write: the last frame's cluster-absolute
    /// timecode in ms.
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the muxer and return the sink. Meaningful after `finalize`.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Queue one encoded chunk. Writes the document header lazily on the
    /// first chunk; flushes the open cluster when this chunk would push it to
    /// [`MAX_CLUSTER_DURATION_MS`].
    pub fn add_chunk(&mut self, chunk: EncodedChunk) -> VidloomResult<()> {
        match self.state {
            MuxState::Finalized => {
                return Err(VidloomError::validation(
                    "cannot add chunks to a finalized muxer",
                ));
            }
            MuxState::Unwritten => self.write_header()?,
            MuxState::HeaderWritten => {}
        }

        let first = *self.first_timestamp_us.get_or_insert(chunk.timestamp_us);
        if chunk.timestamp_us < first {
            return Err(VidloomError::validation(format!(
                "chunk timestamp {}µs precedes the stream start {}µs",
                chunk.timestamp_us, first
            )));
        }
        let normalized_ms = us_to_ms(chunk.timestamp_us - first);
        // The encoder contract is in-order delivery; a regression here would
        // silently corrupt cluster timecodes, so reject it.
        if normalized_ms < self.last_block_ms {
            return Err(VidloomError::validation(format!(
                "out-of-order chunk: {normalized_ms}ms after {}ms",
                self.last_block_ms
            )));
        }

        if self.cluster_frames.is_empty() {
            self.cluster_start_ms = normalized_ms;
        } else {
            let timecode = (normalized_ms - self.cluster_start_ms).round() as i64;
            if timecode + 1 >= MAX_CLUSTER_DURATION_MS {
                self.flush_cluster()?;
                self.cluster_start_ms = normalized_ms;
            }
        }

        let timecode = (normalized_ms - self.cluster_start_ms).round() as i64;
        debug_assert!(timecode <= i64::from(i16::MAX));
        self.cluster_frames.push(MuxedFrame {
            track_number: self.cfg.track_number,
            timecode_ms: timecode as i16,
            data: chunk.data,
            keyframe: chunk.keyframe,
        });
        self.last_block_ms = normalized_ms;
        self.duration_ms = self.cluster_start_ms + timecode as f64;
        Ok(())
    }

    /// Complete the document: flush the open cluster, write the cues, patch
    /// the seek head and duration, and finalize the sink. Calling this more
    /// than once is a tolerated no-op.
    pub fn finalize(&mut self) -> VidloomResult<()> {
        match self.state {
            MuxState::Finalized => return Ok(()),
            MuxState::Unwritten => self.write_header()?,
            MuxState::HeaderWritten => {}
        }

        self.flush_cluster()?;
        self.write_cues()?;

        let mut seek_head = build_seek_head(
            self.info_offset - self.segment_data_offset,
            self.tracks_offset - self.segment_data_offset,
            self.cues_offset - self.segment_data_offset,
        );
        self.rewrite_at(self.seek_head_offset, &mut seek_head, SEEK_HEAD_CAPACITY)?;

        let mut duration = EbmlElement::float64(ids::DURATION, self.duration_ms);
        self.rewrite_at(self.duration_offset, &mut duration, DURATION_CAPACITY)?;

        self.sink.finalize()?;
        self.state = MuxState::Finalized;
        tracing::debug!(
            clusters = self.clusters_written,
            cues = self.cues.len(),
            duration_ms = self.duration_ms,
            "finalized webm document"
        );
        Ok(())
    }

    fn write_header(&mut self) -> VidloomResult<()> {
        let base = self.sink.position();
        let mut buf = StreamBuffer::with_capacity(HEADER_CAPACITY);

        let mut ebml = EbmlElement::container(
            ids::EBML,
            vec![
                EbmlElement::uint(ids::EBML_VERSION, 1).into(),
                EbmlElement::uint(ids::EBML_READ_VERSION, 1).into(),
                EbmlElement::uint(ids::EBML_MAX_ID_LENGTH, 4).into(),
                EbmlElement::uint(ids::EBML_MAX_SIZE_LENGTH, 8).into(),
                EbmlElement::string(ids::DOC_TYPE, "webm").into(),
                EbmlElement::uint(ids::DOC_TYPE_VERSION, 2).into(),
                EbmlElement::uint(ids::DOC_TYPE_READ_VERSION, 2).into(),
            ],
        );
        write_element(&mut buf, base, &mut ebml)?;

        // The segment's children are appended over the whole session, so its
        // size is the reserved unknown marker and needs no patch.
        let mut segment = EbmlElement::unbounded(ids::SEGMENT, vec![]);
        write_element(&mut buf, base, &mut segment)?;
        self.segment_data_offset = segment.data_offset;

        // Positions are unknown until finalize; the 5-byte width keeps the
        // element's byte length stable across the rewrite.
        let mut seek_head = build_seek_head(0, 0, 0);
        write_element(&mut buf, base, &mut seek_head)?;
        self.seek_head_offset = seek_head.offset;

        let mut info = EbmlElement::container(
            ids::INFO,
            vec![
                EbmlElement::uint(ids::TIMESTAMP_SCALE, TIMESTAMP_SCALE_NS).into(),
                EbmlElement::string(ids::MUXING_APP, APP_NAME).into(),
                EbmlElement::string(ids::WRITING_APP, APP_NAME).into(),
                EbmlElement::float64(ids::DURATION, 0.0).into(),
            ],
        );
        write_element(&mut buf, base, &mut info)?;
        self.info_offset = info.offset;
        self.duration_offset = info
            .find(ids::DURATION)
            .ok_or_else(|| VidloomError::encoding("segment info lost its duration"))?
            .offset;

        let mut tracks = EbmlElement::container(
            ids::TRACKS,
            vec![
                EbmlElement::container(
                    ids::TRACK_ENTRY,
                    vec![
                        EbmlElement::uint(ids::TRACK_NUMBER, self.cfg.track_number).into(),
                        EbmlElement::uint(ids::TRACK_UID, self.cfg.track_number).into(),
                        EbmlElement::uint(ids::FLAG_LACING, 0).into(),
                        EbmlElement::string(ids::CODEC_ID, self.cfg.codec_id.clone()).into(),
                        // Track type 1 = video.
                        EbmlElement::uint(ids::TRACK_TYPE, 1).into(),
                        EbmlElement::container(
                            ids::VIDEO,
                            vec![
                                EbmlElement::uint(ids::PIXEL_WIDTH, u64::from(self.cfg.width))
                                    .into(),
                                EbmlElement::uint(ids::PIXEL_HEIGHT, u64::from(self.cfg.height))
                                    .into(),
                            ],
                        )
                        .into(),
                    ],
                )
                .into(),
            ],
        );
        write_element(&mut buf, base, &mut tracks)?;
        self.tracks_offset = tracks.offset;

        self.sink.write(buf.data()?)?;
        self.state = MuxState::HeaderWritten;
        tracing::debug!(codec = %self.cfg.codec_id, "wrote webm header");
        Ok(())
    }

    fn flush_cluster(&mut self) -> VidloomResult<()> {
        if self.cluster_frames.is_empty() {
            return Ok(());
        }
        let cluster_offset = self.sink.position();
        let timecode_ms = self.cluster_start_ms.round() as u64;
        let frames = std::mem::take(&mut self.cluster_frames);
        let frame_count = frames.len();

        let mut capacity = 64;
        let mut children: Vec<EbmlNode> = Vec::with_capacity(frame_count + 1);
        children.push(EbmlElement::uint(ids::TIMESTAMP, timecode_ms).into());
        for frame in frames {
            capacity += frame.data.len() + PER_BLOCK_OVERHEAD;
            children.push(simple_block(frame)?.into());
        }

        let mut cluster = EbmlElement::container(ids::CLUSTER, children);
        let mut buf = StreamBuffer::with_capacity(capacity);
        write_element(&mut buf, cluster_offset, &mut cluster)?;
        self.sink.write(buf.data()?)?;

        self.cues.push(CueRecord {
            time_ms: timecode_ms,
            cluster_pos: cluster_offset - self.segment_data_offset,
        });
        self.clusters_written += 1;
        tracing::debug!(
            cluster = self.clusters_written,
            frames = frame_count,
            timecode_ms,
            "flushed cluster"
        );
        Ok(())
    }

    fn write_cues(&mut self) -> VidloomResult<()> {
        if self.cues_written {
            return Ok(());
        }
        let offset = self.sink.position();
        let children: Vec<EbmlNode> = self
            .cues
            .iter()
            .map(|cue| {
                EbmlElement::container(
                    ids::CUE_POINT,
                    vec![
                        EbmlElement::uint(ids::CUE_TIME, cue.time_ms).into(),
                        EbmlElement::container(
                            ids::CUE_TRACK_POSITIONS,
                            vec![
                                EbmlElement::uint(ids::CUE_TRACK, self.cfg.track_number).into(),
                                EbmlElement::uint(ids::CUE_CLUSTER_POSITION, cue.cluster_pos)
                                    .into(),
                            ],
                        )
                        .into(),
                    ],
                )
                .into()
            })
            .collect();

        let mut cues = EbmlElement::container(ids::CUES, children);
        let mut buf = StreamBuffer::with_capacity(16 + PER_CUE_CAPACITY * self.cues.len());
        write_element(&mut buf, offset, &mut cues)?;
        self.sink.write(buf.data()?)?;
        self.cues_offset = offset;
        self.cues_written = true;
        Ok(())
    }

    /// Re-serialize `el` over its previously written bytes, then return the
    /// cursor to the end of the document. The element must serialize to the
    /// same byte length as when first written.
    fn rewrite_at(
        &mut self,
        offset: u64,
        el: &mut EbmlElement,
        capacity: usize,
    ) -> VidloomResult<()> {
        let mut buf = StreamBuffer::with_capacity(capacity);
        write_element(&mut buf, offset, el)?;
        let end = self.sink.position();
        self.sink.seek(offset)?;
        self.sink.write(buf.data()?)?;
        self.sink.seek(end)?;
        Ok(())
    }
}

fn build_seek_head(info_pos: u64, tracks_pos: u64, cues_pos: u64) -> EbmlElement {
    fn entry(target_id: u32, pos: u64) -> EbmlNode {
        EbmlElement::container(
            ids::SEEK,
            vec![
                EbmlElement::bytes(ids::SEEK_ID, target_id.to_be_bytes().to_vec()).into(),
                EbmlElement::uint_with_width(ids::SEEK_POSITION, pos, 5).into(),
            ],
        )
        .into()
    }

    EbmlElement::container(
        ids::SEEK_HEAD,
        vec![
            entry(ids::INFO, info_pos),
            entry(ids::TRACKS, tracks_pos),
            entry(ids::CUES, cues_pos),
        ],
    )
}
