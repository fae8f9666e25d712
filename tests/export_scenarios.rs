//! End-to-end export scenarios over the public API

use std::fs;
use std::io::Cursor;

use pdf_toolkit::pdf::schema::{TypedDictionary, TypedObject};
use pdf_toolkit::pdf::{
    Body, Document, Handle, LinkageKind, ObjectId, ObjectType, PdfWriter, StreamState, WriterOptions,
};
use pdf_toolkit::{PDFToolkitError, PDFToolkitResult, PdfVersion};
use pretty_assertions::assert_eq;
use test_log::test;

fn definition(handle: &Handle) -> PDFToolkitResult<String> {
    let mut sink = Cursor::new(Vec::new());
    handle.object()?.export_as_definition(&mut sink, PdfVersion::Pdf17)?;
    Ok(String::from_utf8_lossy(sink.get_ref()).into_owned())
}

fn inline(handle: &Handle) -> PDFToolkitResult<String> {
    let mut sink = Cursor::new(Vec::new());
    handle.export(&mut sink, PdfVersion::Pdf17)?;
    Ok(String::from_utf8_lossy(sink.get_ref()).into_owned())
}

#[test]
fn indirect_integer_definition_and_reference() -> PDFToolkitResult<()> {
    let document = Document::new();
    let answer = document.indirect(42i64)?;

    assert_eq!(definition(&answer)?, "1 0 obj\r\n42\r\nendobj");
    assert_eq!(inline(&answer)?, "1 0 R");
    assert_eq!(document.last_id(), ObjectId::new(1));
    Ok(())
}

#[test]
fn dictionary_with_indirect_count() -> PDFToolkitResult<()> {
    let document = Document::new();
    let dict = document.new_dictionary(LinkageKind::Direct)?;
    dict.set("Count", document.indirect(42i64)?)?;

    assert_eq!(inline(&dict)?, "<</Count 1 0 R>>");

    let mut sink = Cursor::new(Vec::new());
    let offsets = document.export_objects(&mut sink, PdfVersion::Pdf17)?;
    assert_eq!(String::from_utf8_lossy(sink.get_ref()), "1 0 obj\r\n42\r\nendobj\r\n");
    assert_eq!(offsets, vec![(ObjectId::new(1), 0)]);
    Ok(())
}

#[test]
fn direct_children_are_inlined() -> PDFToolkitResult<()> {
    let document = Document::new();
    let dict = document.new_dictionary(LinkageKind::Indirect)?;
    let shared = document.indirect(Body::text("shared"))?;

    dict.set("Size", document.direct(3i64)?)?;
    dict.set("Ratio", Handle::from(0.5))?;
    dict.set("Label", shared.clone())?;
    dict.set("Tags", Handle::array(vec![Handle::name("A"), Handle::from(true), Handle::null()]))?;

    assert_eq!(
        definition(&dict)?,
        "1 0 obj\r\n<</Size 3 /Ratio 0.5 /Label 2 0 R /Tags [/A true null]>>\r\nendobj"
    );
    assert_eq!(definition(&shared)?, "2 0 obj\r\n(shared)\r\nendobj");
    Ok(())
}

#[test]
fn filter_pipeline_round_trip() -> PDFToolkitResult<()> {
    let document = Document::new();
    let raw = b"BT /F1 12 Tf 72 712 Td (A stream with some repeated text) Tj ET\n".repeat(8);
    let stream = document.new_stream(raw.clone())?;

    let params = document.new_dictionary(LinkageKind::Direct)?;
    params.set_integer("Predictor", 12)?;
    params.set_integer("Columns", 8)?;
    stream.add_filter("FlateDecode", Some(params))?;
    stream.add_filter("ASCIIHexDecode", None)?;
    assert_eq!(stream.filter_names()?, vec!["FlateDecode", "ASCIIHexDecode"]);

    stream.encode()?;
    let encoded = stream.encoded_data()?.ok_or(PDFToolkitError::NullHandle)?;
    assert_eq!(stream.get_integer("Length")?, encoded.len() as i64);

    let text = definition(&stream)?;
    assert!(text.starts_with("1 0 obj\r\n<</Filter [/FlateDecode /ASCIIHexDecode] "));
    assert!(text.contains("/DecodeParms [<</Predictor 12 /Columns 8>> null]"));
    assert!(text.contains(">>\r\nstream\r\n"));
    assert!(text.ends_with("\r\nendstream\r\nendobj"));

    // A second stream holding only the encoded bytes decodes to the original
    let copy = document.new_stream(Vec::new())?;
    let params = document.new_dictionary(LinkageKind::Direct)?;
    params.set_integer("Predictor", 12)?;
    params.set_integer("Columns", 8)?;
    copy.add_filter("Fl", Some(params))?;
    copy.add_filter("AHx", None)?;
    copy.set_encoded_data(encoded)?;
    assert_eq!(copy.stream_state()?, StreamState::Encoded);

    copy.decode()?;
    assert_eq!(copy.data()?, Some(raw));
    assert_eq!(copy.stream_state()?, StreamState::Both);
    Ok(())
}

#[test]
fn removing_last_filter_clears_entries() -> PDFToolkitResult<()> {
    let document = Document::new();
    let stream = document.new_stream(b"plain".to_vec())?;

    stream.add_filter("RunLengthDecode", None)?;
    assert!(stream.contains_key("Filter")?);
    assert!(stream.remove_filter("RL")?);
    assert!(!stream.remove_filter("RunLengthDecode")?);

    assert!(!stream.contains_key("Filter")?);
    assert!(!stream.contains_key("DecodeParms")?);
    assert_eq!(
        definition(&stream)?,
        "1 0 obj\r\n<</Length 5>>\r\nstream\r\nplain\r\nendstream\r\nendobj"
    );
    Ok(())
}

#[test]
fn rejected_filters_leave_stream_untouched() -> PDFToolkitResult<()> {
    let document = Document::new();
    let stream = document.new_stream(b"data".to_vec())?;
    stream.add_filter("FlateDecode", None)?;

    assert!(matches!(
        stream.add_filter("NoSuchDecode", None),
        Err(PDFToolkitError::UnsupportedFilter(_))
    ));
    assert!(matches!(
        stream.add_filter("DCTDecode", None),
        Err(PDFToolkitError::UnsupportedFeature(_))
    ));
    assert_eq!(stream.filter_names()?, vec!["FlateDecode"]);
    assert_eq!(stream.get_name("Filter")?, "FlateDecode");
    Ok(())
}

#[test]
fn reserved_keys_are_managed_by_stream() -> PDFToolkitResult<()> {
    let document = Document::new();
    let stream = document.new_stream(b"x".to_vec())?;
    assert!(matches!(
        stream.set("Length", Handle::from(99i64)),
        Err(PDFToolkitError::UnsupportedFeature(_))
    ));
    stream.set_name("Subtype", "XML")?;
    assert_eq!(stream.get_name("Subtype")?, "XML");
    Ok(())
}

#[test]
fn ownership_cycles_are_refused() -> PDFToolkitResult<()> {
    let document = Document::new();
    let outer = document.new_dictionary(LinkageKind::Indirect)?;
    let inner = document.new_array(Vec::new(), LinkageKind::Indirect)?;

    outer.set("Items", inner.clone())?;
    assert!(matches!(outer.set("Self", outer.clone()), Err(PDFToolkitError::CycleDetected(_))));
    assert!(matches!(inner.push(outer.clone()), Err(PDFToolkitError::CycleDetected(_))));

    // Back-references are fine and render as references
    inner.push(outer.back_reference()?)?;
    assert_eq!(inline(&inner)?, "[1 0 R]");
    assert_eq!(outer.ref_count(), 1);
    Ok(())
}

#[test]
fn released_objects_leave_gaps_in_xref() -> PDFToolkitResult<()> {
    let writer = PdfWriter::new(WriterOptions::default())?;
    let page = writer.add_page([0.0, 0.0, 612.0, 792.0])?;

    let scratch = writer.document().indirect(Body::text("temporary"))?;
    page.set_contents(scratch.clone())?;
    scratch.object()?.ensure_id()?;
    page.handle().remove("Contents")?;
    drop(scratch);

    let mut sink = Cursor::new(Vec::new());
    writer.write(&mut sink)?;
    let text = String::from_utf8_lossy(sink.get_ref()).into_owned();

    assert!(!text.contains("(temporary)"));
    assert!(text.contains("xref\r\n0 5\r\n0000000001 65535 f\r\n0000000000 65535 f\r\n"));
    assert!(text.contains("/Root 2 0 R"));
    Ok(())
}

#[test]
fn typed_dictionaries_round_trip_through_handles() -> PDFToolkitResult<()> {
    let writer = PdfWriter::new(WriterOptions::default())?;
    let page = writer.add_page([0.0, 0.0, 300.0, 400.0])?;

    let handle = page.handle().clone();
    assert!(handle.is_kind_of(ObjectType::Page));
    assert!(handle.is_kind_of(ObjectType::Dictionary));
    assert!(!handle.is_kind_of(ObjectType::Stream));

    let media_box: Vec<f64> = page
        .media_box()?
        .as_array()?
        .iter()
        .map(Handle::as_real)
        .collect::<PDFToolkitResult<_>>()?;
    assert_eq!(media_box, vec![0.0, 0.0, 300.0, 400.0]);
    page.validate()?;
    Ok(())
}

#[test]
fn write_complete_file_to_disk() -> PDFToolkitResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("hello.pdf");

    let mut writer = PdfWriter::new(WriterOptions {
        version: PdfVersion::Pdf14,
        compress_streams: true,
    })?;
    writer.info()?.set_title(b"Hello")?;
    let page = writer.add_page([0.0, 0.0, 612.0, 792.0])?;
    let contents = writer
        .document()
        .new_stream(b"BT /F1 24 Tf 72 720 Td (Hello) Tj ET".to_vec())?;
    page.set_contents(contents)?;

    let mut file = fs::File::create(&path)?;
    let written = writer.write(&mut file)?;
    drop(file);

    let bytes = fs::read(&path)?;
    assert_eq!(bytes.len() as u64, written);
    assert!(bytes.starts_with(b"%PDF-1.4\r\n%\xE2\xE3\xCF\xD3\r\n"));
    assert!(bytes.ends_with(b"%%EOF\r\n"));

    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("/Filter /FlateDecode"));
    assert!(text.contains("/Info "));
    Ok(())
}
