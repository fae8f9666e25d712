//! PDF Toolkit for Rust
//!
//! An object model and serializer for PDF documents. Objects live in a
//! [`pdf::Document`] that hands out object ids lazily, dictionaries are
//! checked against typed schemas, and streams carry a filter pipeline that
//! encodes their payload on export.
//!
//! ```
//! use pdf_toolkit::pdf::{PdfWriter, WriterOptions};
//!
//! # fn main() -> pdf_toolkit::PDFToolkitResult<()> {
//! let writer = PdfWriter::new(WriterOptions::default())?;
//! writer.add_page([0.0, 0.0, 612.0, 792.0])?;
//!
//! let mut output = std::io::Cursor::new(Vec::new());
//! writer.write(&mut output)?;
//! assert!(output.get_ref().starts_with(b"%PDF-1.7"));
//! # Ok(())
//! # }
//! ```

use std::fmt;

mod error;
pub mod pdf;

pub use error::{PDFToolkitError, PDFToolkitResult};

/// PDF versions the writer can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PdfVersion {
    /// PDF 1.0
    Pdf10,
    /// PDF 1.1
    Pdf11,
    /// PDF 1.2, first version with FlateDecode
    Pdf12,
    /// PDF 1.3
    Pdf13,
    /// PDF 1.4
    Pdf14,
    /// PDF 1.5
    Pdf15,
    /// PDF 1.6
    Pdf16,
    /// PDF 1.7 (ISO 32000-1)
    #[default]
    Pdf17,
    /// PDF 2.0 (ISO 32000-2)
    Pdf20,
}

impl PdfVersion {
    /// `(major, minor)` as written in the file header
    pub fn numbers(&self) -> (u8, u8) {
        match self {
            PdfVersion::Pdf10 => (1, 0),
            PdfVersion::Pdf11 => (1, 1),
            PdfVersion::Pdf12 => (1, 2),
            PdfVersion::Pdf13 => (1, 3),
            PdfVersion::Pdf14 => (1, 4),
            PdfVersion::Pdf15 => (1, 5),
            PdfVersion::Pdf16 => (1, 6),
            PdfVersion::Pdf17 => (1, 7),
            PdfVersion::Pdf20 => (2, 0),
        }
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.numbers();
        write!(f, "{}.{}", major, minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_display() {
        assert_eq!(PdfVersion::Pdf10.to_string(), "1.0");
        assert_eq!(PdfVersion::Pdf17.to_string(), "1.7");
        assert_eq!(PdfVersion::Pdf20.to_string(), "2.0");
        assert_eq!(PdfVersion::default(), PdfVersion::Pdf17);
    }

    #[test]
    fn test_version_ordering() {
        assert!(PdfVersion::Pdf12 > PdfVersion::Pdf11);
        assert!(PdfVersion::Pdf20 > PdfVersion::Pdf17);
    }
}
