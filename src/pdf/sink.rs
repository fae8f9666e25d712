//! Byte sink that export passes write into

use std::io::{Seek, SeekFrom, Write};
use crate::error::PDFToolkitResult;

/// Sequential byte output with position queries.
///
/// The sink is owned and closed by the caller; exporting only writes and
/// reads or moves the position.
pub trait ByteSink {
    /// Write a single byte
    fn put_byte(&mut self, byte: u8) -> PDFToolkitResult<()> {
        self.put_bytes(&[byte])
    }

    /// Write a byte slice
    fn put_bytes(&mut self, bytes: &[u8]) -> PDFToolkitResult<()>;

    /// Write a string as raw bytes
    fn put_string(&mut self, s: &str) -> PDFToolkitResult<()> {
        self.put_bytes(s.as_bytes())
    }

    /// Current write position
    fn tell(&mut self) -> PDFToolkitResult<u64>;

    /// Move the write position to an absolute offset
    fn seek(&mut self, pos: u64) -> PDFToolkitResult<()>;
}

impl<T: Write + Seek> ByteSink for T {
    fn put_bytes(&mut self, bytes: &[u8]) -> PDFToolkitResult<()> {
        self.write_all(bytes)?;
        Ok(())
    }

    fn tell(&mut self) -> PDFToolkitResult<u64> {
        Ok(self.stream_position()?)
    }

    fn seek(&mut self, pos: u64) -> PDFToolkitResult<()> {
        Seek::seek(self, SeekFrom::Start(pos))?;
        Ok(())
    }
}
