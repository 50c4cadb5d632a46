use std::{
    fs::File,
    io::{Seek as _, SeekFrom, Write as _},
    path::Path,
};

use anyhow::Context as _;

use crate::foundation::error::{VidloomError, VidloomResult};

/// Output sink contract: append-only at a movable cursor.
///
/// The muxer is the sink's single writer; every repositioned write is an
/// explicit `seek` followed by `write`, so no two writes are ever in flight
/// concurrently.
pub trait WriteSink {
    /// Write `bytes` at the current position and advance it.
    fn write(&mut self, bytes: &[u8]) -> VidloomResult<()>;

    /// Reposition the cursor. Seeking past the end of what has been written
    /// is an error.
    fn seek(&mut self, pos: u64) -> VidloomResult<()>;

    /// Current cursor position.
    fn position(&self) -> u64;

    /// Flush and close the byte sequence. Called exactly once, at muxer
    /// finalization.
    fn finalize(&mut self) -> VidloomResult<()>;
}

/// Vec-backed sink for tests and in-memory exports.
#[derive(Clone, Debug, Default)]
pub struct InMemorySink {
    data: Vec<u8>,
    pos: usize,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow everything written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the sink, returning the complete byte sequence.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl WriteSink for InMemorySink {
    fn write(&mut self, bytes: &[u8]) -> VidloomResult<()> {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> VidloomResult<()> {
        if pos as usize > self.data.len() {
            return Err(VidloomError::validation(format!(
                "seek to {pos} is beyond the {} bytes written",
                self.data.len()
            )));
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn finalize(&mut self) -> VidloomResult<()> {
        Ok(())
    }
}

/// File-backed sink used by the CLI.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    pos: u64,
}

impl FileSink {
    pub fn create(path: &Path) -> VidloomResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("create output directory '{}'", parent.display())
            })?;
        }
        let file = File::create(path)
            .with_context(|| format!("create output file '{}'", path.display()))?;
        Ok(Self { file, pos: 0 })
    }
}

impl WriteSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> VidloomResult<()> {
        self.file
            .write_all(bytes)
            .context("write to output file")?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> VidloomResult<()> {
        self.file
            .seek(SeekFrom::Start(pos))
            .context("seek in output file")?;
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn finalize(&mut self) -> VidloomResult<()> {
        self.file.flush().context("flush output file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_appends_and_overwrites() {
        let mut sink = InMemorySink::new();
        sink.write(&[1, 2, 3, 4]).unwrap();
        sink.seek(1).unwrap();
        sink.write(&[9]).unwrap();
        assert_eq!(sink.position(), 2);
        sink.seek(4).unwrap();
        sink.write(&[5]).unwrap();
        assert_eq!(sink.bytes(), &[1, 9, 3, 4, 5]);
    }

    #[test]
    fn in_memory_sink_rejects_seek_past_end() {
        let mut sink = InMemorySink::new();
        sink.write(&[0; 4]).unwrap();
        assert!(sink.seek(5).is_err());
        assert!(sink.seek(4).is_ok());
    }

    #[test]
    fn file_sink_round_trips_seek_patches() {
        let dir = std::env::temp_dir().join(format!(
            "vidloom_sink_test_{}",
            std::process::id()
        ));
        let path = dir.join("out.bin");
        let mut sink = FileSink::create(&path).unwrap();
        sink.write(&[0, 0, 0, 0]).unwrap();
        sink.seek(1).unwrap();
        sink.write(&[7, 8]).unwrap();
        sink.seek(4).unwrap();
        sink.finalize().unwrap();
        drop(sink);

        assert_eq!(std::fs::read(&path).unwrap(), vec![0, 7, 8, 0]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
