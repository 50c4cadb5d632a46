use crate::ebml::stream::{StreamBuffer, measure_uint};
use crate::foundation::error::VidloomResult;

/// Scalar or container payload of an [`EbmlElement`].
#[derive(Clone, Debug)]
pub enum EbmlData {
    UInt(u64),
    Float32(f32),
    Float64(f64),
    Bytes(Vec<u8>),
    Str(String),
    Children(Vec<EbmlNode>),
}

/// One node of the serialized document: either raw bytes copied verbatim or
/// a tagged element.
#[derive(Clone, Debug)]
pub enum EbmlNode {
    Raw(Vec<u8>),
    Element(EbmlElement),
}

impl From<EbmlElement> for EbmlNode {
    fn from(el: EbmlElement) -> Self {
        Self::Element(el)
    }
}

/// A tagged EBML element.
///
/// `offset` and `data_offset` are recorded when the element is written; the
/// muxer uses them for cross-references (seek head, cues, duration patching).
#[derive(Clone, Debug)]
pub struct EbmlElement {
    pub id: u32,
    pub data: EbmlData,
    /// Explicit byte width override for `UInt` payloads (e.g. the 5-byte
    /// seek positions reserved before their values are known).
    pub uint_width: Option<usize>,
    /// Write the reserved unknown-size marker instead of a real size. Used
    /// for the Segment, whose children are appended over the whole session.
    pub unknown_size: bool,
    pub offset: u64,
    pub data_offset: u64,
}

impl EbmlElement {
    fn new(id: u32, data: EbmlData) -> Self {
        Self {
            id,
            data,
            uint_width: None,
            unknown_size: false,
            offset: 0,
            data_offset: 0,
        }
    }

    pub fn uint(id: u32, value: u64) -> Self {
        Self::new(id, EbmlData::UInt(value))
    }

    /// Unsigned integer leaf with a fixed payload width.
    pub fn uint_with_width(id: u32, value: u64, width: usize) -> Self {
        Self {
            uint_width: Some(width),
            ..Self::new(id, EbmlData::UInt(value))
        }
    }

    pub fn float32(id: u32, value: f32) -> Self {
        Self::new(id, EbmlData::Float32(value))
    }

    pub fn float64(id: u32, value: f64) -> Self {
        Self::new(id, EbmlData::Float64(value))
    }

    pub fn bytes(id: u32, data: Vec<u8>) -> Self {
        Self::new(id, EbmlData::Bytes(data))
    }

    pub fn string(id: u32, s: impl Into<String>) -> Self {
        Self::new(id, EbmlData::Str(s.into()))
    }

    pub fn container(id: u32, children: Vec<EbmlNode>) -> Self {
        Self::new(id, EbmlData::Children(children))
    }

    /// Container whose total size is written as the reserved unknown marker.
    pub fn unbounded(id: u32, children: Vec<EbmlNode>) -> Self {
        Self {
            unknown_size: true,
            ..Self::new(id, EbmlData::Children(children))
        }
    }

    /// Depth-first search for the first descendant element with `id`
    /// (including self). Used to read back recorded offsets after a write.
    pub fn find(&self, id: u32) -> Option<&EbmlElement> {
        if self.id == id {
            return Some(self);
        }
        if let EbmlData::Children(children) = &self.data {
            for node in children {
                if let EbmlNode::Element(el) = node
                    && let Some(found) = el.find(id)
                {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// Reserved single-byte size marker for containers of unknown extent.
const UNKNOWN_SIZE_MARKER: u8 = 0xFF;

/// Width of the back-patched size placeholder for determinate containers.
const SIZE_PLACEHOLDER_WIDTH: usize = 4;

/// Serialize one node at the buffer cursor.
///
/// `base` is the absolute file offset of buffer position 0; every element has
/// its absolute `offset`/`data_offset` recorded as it is written.
pub fn write_node(buf: &mut StreamBuffer, base: u64, node: &mut EbmlNode) -> VidloomResult<()> {
    match node {
        EbmlNode::Raw(bytes) => buf.write_bytes(bytes),
        EbmlNode::Element(el) => write_element(buf, base, el),
    }
}

/// Serialize a sibling list in order.
pub fn write_nodes(
    buf: &mut StreamBuffer,
    base: u64,
    nodes: &mut [EbmlNode],
) -> VidloomResult<()> {
    for node in nodes {
        write_node(buf, base, node)?;
    }
    Ok(())
}

/// Serialize one element at the buffer cursor. See [`write_node`].
pub fn write_element(
    buf: &mut StreamBuffer,
    base: u64,
    el: &mut EbmlElement,
) -> VidloomResult<()> {
    el.offset = base + buf.position();

    // EBML ids carry their own length-marker bits; write them raw.
    buf.write_uint_be(u64::from(el.id), measure_uint(u64::from(el.id))?)?;

    match &mut el.data {
        EbmlData::Children(children) if el.unknown_size => {
            buf.write_u8(UNKNOWN_SIZE_MARKER)?;
            el.data_offset = base + buf.position();
            write_nodes(buf, base, children)?;
        }
        EbmlData::Children(children) => {
            let size_pos = buf.position();
            buf.write_uint_be(0, SIZE_PLACEHOLDER_WIDTH)?;
            let data_start = buf.position();
            el.data_offset = base + data_start;
            write_nodes(buf, base, children)?;
            let end = buf.position();
            buf.seek(size_pos);
            buf.write_vint_width(end - data_start, SIZE_PLACEHOLDER_WIDTH)?;
            buf.seek(end);
        }
        EbmlData::UInt(value) => {
            let width = match el.uint_width {
                Some(w) => w,
                None => measure_uint(*value)?,
            };
            buf.write_vint(width as u64)?;
            el.data_offset = base + buf.position();
            buf.write_uint_be(*value, width)?;
        }
        EbmlData::Float32(value) => {
            buf.write_vint(4)?;
            el.data_offset = base + buf.position();
            buf.write_f32_be(*value)?;
        }
        EbmlData::Float64(value) => {
            buf.write_vint(8)?;
            el.data_offset = base + buf.position();
            buf.write_f64_be(*value)?;
        }
        EbmlData::Bytes(bytes) => {
            buf.write_vint(bytes.len() as u64)?;
            el.data_offset = base + buf.position();
            let bytes = std::mem::take(bytes);
            buf.write_bytes(&bytes)?;
            el.data = EbmlData::Bytes(bytes);
        }
        EbmlData::Str(s) => {
            buf.write_vint(s.len() as u64)?;
            el.data_offset = base + buf.position();
            let s = std::mem::take(s);
            buf.write_str(&s)?;
            el.data = EbmlData::Str(s);
        }
    }

    Ok(())
}
