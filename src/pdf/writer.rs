//! Complete file output: header, body, cross-reference table and trailer

use log::{debug, info};

use crate::error::PDFToolkitResult;
use crate::PdfVersion;
use super::schema::{TypedDictionary, TypedObject};
use super::{ByteSink, Catalog, Document, DocumentInfo, LinkageKind, ObjectType, Page, XRefTable};

/// Comment line of high bytes marking the file as binary
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\r\n";

/// File writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Version written to the header and passed to every export call
    pub version: PdfVersion,
    /// Add FlateDecode to streams that have no filters.
    ///
    /// The filter is added to the stream objects themselves and stays in
    /// their chain after `write` returns, even when the write fails.
    pub compress_streams: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: PdfVersion::Pdf17,
            compress_streams: false,
        }
    }
}

/// Writes a document rooted at a catalog as a complete PDF file
#[derive(Debug)]
pub struct PdfWriter {
    document: Document,
    catalog: Catalog,
    info: Option<DocumentInfo>,
    options: WriterOptions,
}

impl PdfWriter {
    pub fn new(options: WriterOptions) -> PDFToolkitResult<Self> {
        let document = Document::new();
        let catalog = Catalog::new(&document)?;
        Ok(Self {
            document,
            catalog,
            info: None,
            options,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Information dictionary, created on first use
    pub fn info(&mut self) -> PDFToolkitResult<&DocumentInfo> {
        let info = match self.info.take() {
            Some(info) => info,
            None => DocumentInfo::create(&self.document, LinkageKind::Indirect)?,
        };
        Ok(self.info.insert(info))
    }

    /// Create a page and append it to the root page tree
    pub fn add_page(&self, media_box: [f64; 4]) -> PDFToolkitResult<Page> {
        let page = Page::new(&self.document, media_box)?;
        self.catalog.pages()?.add_page(&page)?;
        Ok(page)
    }

    /// Write the whole file; returns the number of bytes written
    pub fn write(&self, sink: &mut dyn ByteSink) -> PDFToolkitResult<u64> {
        let start = sink.tell()?;
        let version = self.options.version;

        self.catalog.validate()?;
        let tree = self.catalog.pages()?;
        tree.validate()?;
        for page in tree.pages()? {
            page.validate()?;
        }

        if self.options.compress_streams {
            self.compress_streams()?;
        }

        sink.put_string(&format!("%PDF-{}\r\n", version))?;
        sink.put_bytes(BINARY_MARKER)?;

        // Ids are assigned in reference order, so the root gets the first one
        let root_id = self.catalog.handle().object()?.ensure_id()?;
        let info_id = match &self.info {
            Some(info) => Some(info.handle().object()?.ensure_id()?),
            None => None,
        };

        let offsets: Vec<_> = self
            .document
            .export_objects(sink, version)?
            .into_iter()
            .map(|(id, offset)| (id, offset - start))
            .collect();

        let xref_offset = sink.tell()? - start;
        let table = XRefTable::from_offsets(&offsets, self.document.last_id());
        table.write_to(sink)?;

        sink.put_string(&format!("trailer\r\n<</Size {} /Root {} 0 R", table.size(), root_id))?;
        if let Some(info_id) = info_id {
            sink.put_string(&format!(" /Info {} 0 R", info_id))?;
        }
        sink.put_string(&format!(">>\r\nstartxref\r\n{}\r\n%%EOF\r\n", xref_offset))?;

        let written = sink.tell()? - start;
        info!(
            "Wrote PDF {} with {} objects ({} bytes)",
            version,
            offsets.len(),
            written
        );
        Ok(written)
    }

    fn compress_streams(&self) -> PDFToolkitResult<()> {
        for handle in self.document.indirect_objects() {
            if handle.is_kind_of(ObjectType::Stream) && handle.filter_names()?.is_empty() {
                handle.add_filter("FlateDecode", None)?;
                debug!("Compressing {:?}", handle);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use pretty_assertions::assert_eq;
    use test_log::test;
    use crate::pdf::{Body, ObjectId};

    fn output(writer: &PdfWriter) -> PDFToolkitResult<String> {
        let mut sink = Cursor::new(Vec::new());
        let written = writer.write(&mut sink)?;
        assert_eq!(written as usize, sink.get_ref().len());
        Ok(String::from_utf8_lossy(sink.get_ref()).into_owned())
    }

    #[test]
    fn test_minimal_file_layout() -> PDFToolkitResult<()> {
        let writer = PdfWriter::new(WriterOptions::default())?;
        writer.add_page([0.0, 0.0, 612.0, 792.0])?;
        let text = output(&writer)?;

        assert!(text.starts_with("%PDF-1.7\r\n"));
        assert!(text.contains("1 0 obj\r\n<</Type /Catalog /Pages 2 0 R>>\r\nendobj\r\n"));
        assert!(text.contains("2 0 obj\r\n<</Type /Pages /Kids [3 0 R] /Count 1>>\r\nendobj\r\n"));
        assert!(text.contains("3 0 obj\r\n<</Type /Page /MediaBox [0 0 612 792] /Parent 2 0 R>>\r\nendobj\r\n"));
        assert!(text.contains("trailer\r\n<</Size 4 /Root 1 0 R>>\r\n"));
        assert!(text.ends_with("%%EOF\r\n"));
        Ok(())
    }

    #[test]
    fn test_xref_offsets_point_at_definitions() -> PDFToolkitResult<()> {
        let writer = PdfWriter::new(WriterOptions::default())?;
        writer.add_page([0.0, 0.0, 200.0, 200.0])?;
        let text = output(&writer)?;

        let startxref = text
            .rsplit("startxref\r\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|line| line.trim().parse::<usize>().ok())
            .unwrap_or_default();
        assert!(text[startxref..].starts_with("xref\r\n0 4\r\n"));

        let entries: Vec<&str> = text[startxref..].split("\r\n").skip(3).take(3).collect();
        for (index, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap_or_default();
            assert!(text[offset..].starts_with(&format!("{} 0 obj", index + 1)), "{}", entry);
        }
        Ok(())
    }

    #[test]
    fn test_info_and_released_objects() -> PDFToolkitResult<()> {
        let mut writer = PdfWriter::new(WriterOptions::default())?;
        writer.info()?.set_producer(b"pdf-toolkit")?;

        let scratch = writer.document().indirect(Body::name("Scratch"))?;
        assert_eq!(scratch.object()?.ensure_id()?, ObjectId::new(1));
        drop(scratch);

        let text = output(&writer)?;
        assert!(text.contains("2 0 obj\r\n<</Type /Catalog /Pages 4 0 R>>"));
        assert!(text.contains("3 0 obj\r\n<</Producer (pdf-toolkit)>>"));
        assert!(text.contains(
            "xref\r\n0 5\r\n0000000001 65535 f\r\n0000000000 65535 f\r\n"
        ));
        assert!(text.contains("trailer\r\n<</Size 5 /Root 2 0 R /Info 3 0 R>>\r\n"));
        Ok(())
    }

    #[test]
    fn test_compress_streams_option() -> PDFToolkitResult<()> {
        let writer = PdfWriter::new(WriterOptions {
            version: PdfVersion::Pdf14,
            compress_streams: true,
        })?;
        let page = writer.add_page([0.0, 0.0, 10.0, 10.0])?;
        let contents = writer.document().new_stream(b"0 0 m 10 10 l S".repeat(10))?;
        page.set_contents(contents.clone())?;

        let text = output(&writer)?;
        assert!(text.starts_with("%PDF-1.4\r\n"));
        assert_eq!(contents.filter_names()?, vec!["FlateDecode"]);
        assert!(text.contains("/Filter /FlateDecode"));

        // The chain keeps the filter, and later writes do not stack another
        assert_eq!(output(&writer)?, text);
        assert_eq!(contents.filter_names()?, vec!["FlateDecode"]);
        Ok(())
    }

    #[test]
    fn test_invalid_tree_aborts_before_output() -> PDFToolkitResult<()> {
        let writer = PdfWriter::new(WriterOptions::default())?;
        writer.catalog().pages()?.handle().remove("Count")?;

        let mut sink = Cursor::new(Vec::new());
        assert!(writer.write(&mut sink).is_err());
        assert!(sink.get_ref().is_empty());
        Ok(())
    }
}
