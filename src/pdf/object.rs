//! PDF object node: type tag, linkage and content body

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Weak;
use log::{trace, warn};

use crate::error::{PDFToolkitError, PDFToolkitResult};
use crate::PdfVersion;
use super::document::DocumentState;
use super::{ByteSink, Dictionary, Document, Handle, ObjectType, Stream, WeakHandle};

/// Generation number written for every object; ids are never reused.
pub const GENERATION: u16 = 0;

/// Stable identity of an indirect object. Zero is the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Unassigned id
    pub const NULL: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Linkage requested when an object is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageKind {
    /// Serialized inline wherever it is referenced
    Direct,
    /// Registered with the document and referenced by id
    Indirect,
}

/// Linkage of a live object, fixed at creation
#[derive(Debug)]
pub enum Linkage {
    Direct,
    /// Lazily assigned id, [`ObjectId::NULL`] until first needed
    Indirect(Cell<ObjectId>),
}

impl Linkage {
    pub(crate) fn from_kind(kind: LinkageKind) -> Self {
        match kind {
            LinkageKind::Direct => Linkage::Direct,
            LinkageKind::Indirect => Linkage::Indirect(Cell::new(ObjectId::NULL)),
        }
    }

    pub fn kind(&self) -> LinkageKind {
        match self {
            Linkage::Direct => LinkageKind::Direct,
            Linkage::Indirect(_) => LinkageKind::Indirect,
        }
    }

    pub fn is_indirect(&self) -> bool {
        self.kind() == LinkageKind::Indirect
    }
}

/// Object content
#[derive(Debug)]
pub enum Body {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(String),
    /// Literal string, written as `(...)`
    String(Vec<u8>),
    /// Hexadecimal string, written as `<...>`
    HexString(Vec<u8>),
    Array(Vec<Handle>),
    Dictionary(Dictionary),
    Stream(Stream),
    /// Non-owning back-reference to an indirect object
    Reference(WeakHandle),
}

impl Body {
    /// Name body without the leading slash
    pub fn name(name: impl Into<String>) -> Self {
        Body::Name(name.into())
    }

    /// Literal string body from text
    pub fn text(text: &str) -> Self {
        Body::String(text.as_bytes().to_vec())
    }

    /// Tag of the plain kind this body represents
    pub fn base_type(&self) -> ObjectType {
        match self {
            Body::Null => ObjectType::Null,
            Body::Boolean(_) => ObjectType::Boolean,
            Body::Integer(_) => ObjectType::Integer,
            Body::Real(_) => ObjectType::Real,
            Body::Name(_) => ObjectType::Name,
            Body::String(_) | Body::HexString(_) => ObjectType::String,
            Body::Array(_) => ObjectType::Array,
            Body::Dictionary(_) => ObjectType::Dictionary,
            Body::Stream(_) => ObjectType::Stream,
            Body::Reference(_) => ObjectType::Reference,
        }
    }
}

impl From<bool> for Body {
    fn from(value: bool) -> Self {
        Body::Boolean(value)
    }
}

impl From<i64> for Body {
    fn from(value: i64) -> Self {
        Body::Integer(value)
    }
}

impl From<i32> for Body {
    fn from(value: i32) -> Self {
        Body::Integer(value.into())
    }
}

impl From<f64> for Body {
    fn from(value: f64) -> Self {
        Body::Real(value)
    }
}

impl From<Vec<Handle>> for Body {
    fn from(items: Vec<Handle>) -> Self {
        Body::Array(items)
    }
}

impl From<Dictionary> for Body {
    fn from(dict: Dictionary) -> Self {
        Body::Dictionary(dict)
    }
}

impl From<Stream> for Body {
    fn from(stream: Stream) -> Self {
        Body::Stream(stream)
    }
}

/// A node of the object graph.
///
/// Objects are only reachable through [`Handle`]s and are dropped as soon
/// as the last owning handle goes away. The back-pointer to the owning
/// document is weak.
#[derive(Debug)]
pub struct Object {
    tag: ObjectType,
    linkage: Linkage,
    document: Weak<DocumentState>,
    body: RefCell<Body>,
}

impl Object {
    pub(crate) fn new(
        tag: ObjectType,
        body: Body,
        linkage: LinkageKind,
        document: Weak<DocumentState>,
    ) -> PDFToolkitResult<Self> {
        let base = body.base_type();
        if !tag.is_kind_of(base) {
            return Err(PDFToolkitError::type_mismatch(base, tag));
        }
        Ok(Self {
            tag,
            linkage: Linkage::from_kind(linkage),
            document,
            body: RefCell::new(body),
        })
    }

    /// Direct object with no owning document
    pub(crate) fn detached(body: Body) -> Self {
        Self {
            tag: body.base_type(),
            linkage: Linkage::Direct,
            document: Weak::new(),
            body: RefCell::new(body),
        }
    }

    /// Own type tag
    pub fn object_type(&self) -> ObjectType {
        self.tag
    }

    pub fn is_kind_of(&self, tag: ObjectType) -> bool {
        self.tag.is_kind_of(tag)
    }

    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    pub fn is_indirect(&self) -> bool {
        self.linkage.is_indirect()
    }

    /// Assigned id, or [`ObjectId::NULL`] for direct and not yet referenced objects
    pub fn id(&self) -> ObjectId {
        match &self.linkage {
            Linkage::Direct => ObjectId::NULL,
            Linkage::Indirect(id) => id.get(),
        }
    }

    /// Owning document, if it is still alive
    pub fn document(&self) -> Option<Document> {
        self.document.upgrade().map(Document::from_state)
    }

    pub fn body(&self) -> Ref<'_, Body> {
        self.body.borrow()
    }

    pub fn body_mut(&self) -> RefMut<'_, Body> {
        self.body.borrow_mut()
    }

    /// Return the object id, taking the next one from the document on first use
    pub fn ensure_id(&self) -> PDFToolkitResult<ObjectId> {
        match &self.linkage {
            Linkage::Direct => Err(PDFToolkitError::NotIndirect(self.tag)),
            Linkage::Indirect(id) => {
                if id.get().is_null() {
                    let document = self.document().ok_or(PDFToolkitError::DetachedObject)?;
                    let assigned = document.next_id()?;
                    id.set(assigned);
                    trace!("Assigned object id {} to {} object", assigned, self.tag);
                }
                Ok(id.get())
            }
        }
    }

    /// Write `id gen R`
    pub fn export_as_reference(
        &self,
        sink: &mut dyn ByteSink,
        _version: PdfVersion,
    ) -> PDFToolkitResult<()> {
        let id = self.ensure_id()?;
        sink.put_string(&format!("{} {} R", id, GENERATION))
    }

    /// Write the full `id gen obj ... endobj` envelope
    pub fn export_as_definition(
        &self,
        sink: &mut dyn ByteSink,
        version: PdfVersion,
    ) -> PDFToolkitResult<()> {
        let id = self.ensure_id()?;
        sink.put_string(&format!("{} {} obj\r\n", id, GENERATION))?;
        self.export_content(sink, version)?;
        sink.put_string("\r\nendobj")
    }

    /// Write the object's own content, inlining direct children
    pub fn export_content(
        &self,
        sink: &mut dyn ByteSink,
        version: PdfVersion,
    ) -> PDFToolkitResult<()> {
        if let Body::Stream(stream) = &mut *self.body.borrow_mut() {
            stream.prepare_export()?;
        }

        let body = self.body.borrow();
        match &*body {
            Body::Null => sink.put_string("null"),
            Body::Boolean(value) => sink.put_string(if *value { "true" } else { "false" }),
            Body::Integer(value) => sink.put_string(&value.to_string()),
            Body::Real(value) => sink.put_string(&format_real(*value)?),
            Body::Name(name) => write_name(sink, name),
            Body::String(bytes) => write_literal_string(sink, bytes),
            Body::HexString(bytes) => write_hex_string(sink, bytes),
            Body::Array(items) => {
                sink.put_byte(b'[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        sink.put_byte(b' ')?;
                    }
                    item.export(sink, version)?;
                }
                sink.put_byte(b']')
            }
            Body::Dictionary(dict) => dict.write_to(sink, version),
            Body::Stream(stream) => stream.write_to(sink, version),
            Body::Reference(target) => match target.upgrade() {
                Some(handle) => handle.object()?.export_as_reference(sink, version),
                None => {
                    warn!("Back-reference target released, writing null");
                    sink.put_string("null")
                }
            },
        }
    }

    /// Owning child edges, used by the cycle guard
    pub(crate) fn owned_children(&self, out: &mut Vec<Handle>) {
        match &*self.body.borrow() {
            Body::Array(items) => out.extend(items.iter().cloned()),
            Body::Dictionary(dict) => out.extend(dict.values().cloned()),
            Body::Stream(stream) => out.extend(stream.dictionary().values().cloned()),
            _ => {}
        }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        trace!("Releasing {} object (id {})", self.tag, self.id());
    }
}

/// Bytes that may appear unescaped in a name
fn is_regular_name_byte(byte: u8) -> bool {
    matches!(byte, b'!'..=b'~')
        && !matches!(
            byte,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
        )
}

/// Write `/Name`, escaping irregular bytes as `#XX`
pub(crate) fn write_name(sink: &mut dyn ByteSink, name: &str) -> PDFToolkitResult<()> {
    sink.put_byte(b'/')?;
    for &byte in name.as_bytes() {
        if is_regular_name_byte(byte) {
            sink.put_byte(byte)?;
        } else {
            sink.put_string(&format!("#{:02X}", byte))?;
        }
    }
    Ok(())
}

pub(crate) fn write_literal_string(sink: &mut dyn ByteSink, bytes: &[u8]) -> PDFToolkitResult<()> {
    sink.put_byte(b'(')?;
    for &byte in bytes {
        match byte {
            b'\\' => sink.put_bytes(b"\\\\")?,
            b'(' => sink.put_bytes(b"\\(")?,
            b')' => sink.put_bytes(b"\\)")?,
            b'\r' => sink.put_bytes(b"\\r")?,
            b'\n' => sink.put_bytes(b"\\n")?,
            _ => sink.put_byte(byte)?,
        }
    }
    sink.put_byte(b')')
}

pub(crate) fn write_hex_string(sink: &mut dyn ByteSink, bytes: &[u8]) -> PDFToolkitResult<()> {
    sink.put_byte(b'<')?;
    sink.put_string(&hex::encode_upper(bytes))?;
    sink.put_byte(b'>')
}

/// Format a real without exponent or trailing zeros
pub(crate) fn format_real(value: f64) -> PDFToolkitResult<String> {
    if !value.is_finite() {
        return Err(PDFToolkitError::unsupported(format!("non-finite real {}", value)));
    }
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    Ok(if text == "-0" { "0".to_string() } else { text.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn render(handle: &Handle) -> PDFToolkitResult<String> {
        let mut sink = Cursor::new(Vec::new());
        handle.export(&mut sink, PdfVersion::Pdf17)?;
        Ok(String::from_utf8_lossy(sink.get_ref()).into_owned())
    }

    #[rstest]
    #[case(Body::Null, "null")]
    #[case(Body::Boolean(true), "true")]
    #[case(Body::Integer(-17), "-17")]
    #[case(Body::Real(3.0), "3")]
    #[case(Body::Real(-0.25), "-0.25")]
    #[case(Body::Real(-0.0000001), "0")]
    #[case(Body::name("Type"), "/Type")]
    #[case(Body::name("A B#"), "/A#20B#23")]
    #[case(Body::text("a(b)\\c\n"), "(a\\(b\\)\\\\c\\n)")]
    #[case(Body::HexString(vec![0x00, 0xAB, 0x7F]), "<00AB7F>")]
    fn test_scalar_syntax(#[case] body: Body, #[case] expected: &str) -> PDFToolkitResult<()> {
        let document = Document::new();
        let handle = document.direct(body)?;
        assert_eq!(render(&handle)?, expected);
        Ok(())
    }

    #[test]
    fn test_non_finite_real_is_rejected() -> PDFToolkitResult<()> {
        let document = Document::new();
        let handle = document.direct(f64::NAN)?;
        let err = render(&handle).unwrap_err();
        assert!(err.is_unsupported_feature());
        Ok(())
    }

    #[test]
    fn test_tag_must_match_body() {
        let err = Object::new(ObjectType::Page, Body::Integer(1), LinkageKind::Direct, Weak::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PDFToolkitError::InvalidObjectType {
                expected: ObjectType::Integer,
                found: ObjectType::Page
            }
        ));
    }

    #[test]
    fn test_lazy_id_assignment() -> PDFToolkitResult<()> {
        let document = Document::new();
        let object = document.indirect(7i64)?;
        let object = object.object()?;

        assert_eq!(object.linkage().kind(), LinkageKind::Indirect);
        assert!(object.id().is_null());
        let first = object.ensure_id()?;
        let second = object.ensure_id()?;
        assert_eq!(first, ObjectId::new(1));
        assert_eq!(first, second);
        assert_eq!(document.last_id(), first);
        Ok(())
    }

    #[test]
    fn test_direct_object_has_no_id() -> PDFToolkitResult<()> {
        let document = Document::new();
        let handle = document.direct(Body::name("Inline"))?;
        let object = handle.object()?;

        assert_eq!(object.linkage().kind(), LinkageKind::Direct);
        assert!(matches!(object.ensure_id(), Err(PDFToolkitError::NotIndirect(ObjectType::Name))));
        let mut sink = Cursor::new(Vec::new());
        assert!(object.export_as_reference(&mut sink, PdfVersion::Pdf17).is_err());
        assert!(object.export_as_definition(&mut sink, PdfVersion::Pdf17).is_err());
        assert!(sink.get_ref().is_empty());
        Ok(())
    }

    #[test]
    fn test_definition_envelope() -> PDFToolkitResult<()> {
        let document = Document::new();
        let handle = document.indirect(Body::Array(vec![Handle::from(1i64), Handle::name("X")]))?;

        let mut sink = Cursor::new(Vec::new());
        handle.object()?.export_as_definition(&mut sink, PdfVersion::Pdf17)?;
        assert_eq!(
            String::from_utf8_lossy(sink.get_ref()),
            "1 0 obj\r\n[1 /X]\r\nendobj"
        );
        Ok(())
    }

    #[test]
    fn test_detached_indirect_object_cannot_get_id() -> PDFToolkitResult<()> {
        let handle = {
            let document = Document::new();
            document.indirect(1i64)?
        };
        assert!(matches!(
            handle.object()?.ensure_id(),
            Err(PDFToolkitError::DetachedObject)
        ));
        Ok(())
    }
}
