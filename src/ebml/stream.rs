use crate::foundation::error::{VidloomError, VidloomResult};

/// Maximum supported width, in bytes, for both EBML VINTs and unsigned
/// big-endian integers.
pub const MAX_WIDTH: usize = 5;

/// Largest value representable by a 5-byte EBML VINT. The all-ones bit
/// pattern of each width class is reserved, so the usable range of width `w`
/// is `0 ..= 2^(7w) − 2`.
pub const MAX_VINT_VALUE: u64 = (1 << 35) - 2;

/// Smallest VINT width (1–5 bytes) whose class can represent `value` without
/// colliding with that width's reserved all-ones sentinel.
pub fn measure_vint(value: u64) -> VidloomResult<usize> {
    for width in 1..=MAX_WIDTH {
        if value <= (1u64 << (7 * width)) - 2 {
            return Ok(width);
        }
    }
    Err(VidloomError::encoding(format!(
        "value {value} exceeds the maximum representable EBML VINT ({MAX_VINT_VALUE})"
    )))
}

/// Smallest byte width (1–5) whose unsigned range covers `value`.
pub fn measure_uint(value: u64) -> VidloomResult<usize> {
    for width in 1..=MAX_WIDTH {
        if value < 1u64 << (8 * width) {
            return Ok(width);
        }
    }
    Err(VidloomError::encoding(format!(
        "value {value} does not fit in a 5-byte unsigned integer"
    )))
}

/// Append-only, seekable byte buffer with typed write primitives.
///
/// The capacity is fixed at construction; [`StreamBuffer::seek`] repositions
/// the cursor for overwrite and never extends capacity. Writing past the end
/// is an [`VidloomError::Encoding`] error.
#[derive(Debug)]
pub struct StreamBuffer {
    buf: Vec<u8>,
    pos: usize,
}

impl StreamBuffer {
    /// Create a buffer with `capacity` writable bytes, cursor at 0.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            pos: 0,
        }
    }

    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Reposition the cursor. The cursor may be placed anywhere; writes and
    /// [`StreamBuffer::data`] report the error if it lies past capacity.
    pub fn seek(&mut self, pos: u64) {
        self.pos = pos as usize;
    }

    /// The written prefix, from the start of the buffer up to the cursor.
    pub fn data(&self) -> VidloomResult<&[u8]> {
        if self.pos > self.buf.len() {
            return Err(VidloomError::encoding(format!(
                "cursor {} lies beyond buffer capacity {}",
                self.pos,
                self.buf.len()
            )));
        }
        Ok(&self.buf[..self.pos])
    }

    fn slot(&mut self, len: usize) -> VidloomResult<&mut [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            VidloomError::encoding("stream buffer cursor overflow")
        })?;
        if end > self.buf.len() {
            return Err(VidloomError::encoding(format!(
                "write of {len} bytes at {} exceeds buffer capacity {}",
                self.pos,
                self.buf.len()
            )));
        }
        let slot = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(slot)
    }

    pub fn write_u8(&mut self, value: u8) -> VidloomResult<()> {
        self.slot(1)?[0] = value;
        Ok(())
    }

    pub fn write_u16_be(&mut self, value: u16) -> VidloomResult<()> {
        self.slot(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_f32_be(&mut self, value: f32) -> VidloomResult<()> {
        self.slot(4)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_f64_be(&mut self, value: f64) -> VidloomResult<()> {
        self.slot(8)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> VidloomResult<()> {
        self.slot(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Write an ASCII string verbatim (no terminator, no size field).
    pub fn write_str(&mut self, s: &str) -> VidloomResult<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Write `value` as `width` big-endian bytes, most-significant first.
    pub fn write_uint_be(&mut self, value: u64, width: usize) -> VidloomResult<()> {
        if width == 0 || width > MAX_WIDTH {
            return Err(VidloomError::encoding(format!(
                "unsigned integer width must be 1..={MAX_WIDTH}, got {width}"
            )));
        }
        if width < MAX_WIDTH && value >> (8 * width) != 0 {
            return Err(VidloomError::encoding(format!(
                "value {value} does not fit in {width} bytes"
            )));
        }
        if width == MAX_WIDTH && value >> 40 != 0 {
            return Err(VidloomError::encoding(format!(
                "value {value} does not fit in a 5-byte unsigned integer"
            )));
        }
        let slot = self.slot(width)?;
        for (i, b) in slot.iter_mut().enumerate() {
            *b = (value >> (8 * (width - 1 - i))) as u8;
        }
        Ok(())
    }

    /// Write a self-describing EBML VINT using the smallest usable width.
    pub fn write_vint(&mut self, value: u64) -> VidloomResult<()> {
        let width = measure_vint(value)?;
        self.write_vint_width(value, width)
    }

    /// Write `value` as an EBML VINT of an explicit `width`. The width must
    /// be at least the width [`measure_vint`] would choose.
    pub fn write_vint_width(&mut self, value: u64, width: usize) -> VidloomResult<()> {
        if width == 0 || width > MAX_WIDTH {
            return Err(VidloomError::encoding(format!(
                "VINT width must be 1..={MAX_WIDTH}, got {width}"
            )));
        }
        if measure_vint(value)? > width {
            return Err(VidloomError::encoding(format!(
                "value {value} does not fit in a {width}-byte VINT"
            )));
        }
        // The length marker is a single 1 bit at position 7*width of the
        // width-byte big-endian integer.
        let marked = value | (1u64 << (7 * width));
        let slot = self.slot(width)?;
        for (i, b) in slot.iter_mut().enumerate() {
            *b = (marked >> (8 * (width - 1 - i))) as u8;
        }
        Ok(())
    }
}
