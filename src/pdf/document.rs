//! Document id registry and object factory

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use log::{debug, trace};

use crate::error::{PDFToolkitError, PDFToolkitResult};
use crate::PdfVersion;
use super::{Body, ByteSink, Dictionary, Handle, LinkageKind, Object, ObjectId, ObjectType, Stream};

/// Shared state behind a [`Document`]
#[derive(Debug, Default)]
pub(crate) struct DocumentState {
    last_id: Cell<u32>,
    registered: RefCell<Vec<Weak<Object>>>,
}

/// Owner of the object id space.
///
/// Ids are handed out lazily, strictly increasing from 1 and never reused
/// within one document. The registry of indirect objects is weak: it never
/// keeps an object alive.
#[derive(Debug, Clone, Default)]
pub struct Document {
    state: Rc<DocumentState>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: Rc<DocumentState>) -> Self {
        Self { state }
    }

    /// Reserve the next object id
    pub fn next_id(&self) -> PDFToolkitResult<ObjectId> {
        let next = self
            .state
            .last_id
            .get()
            .checked_add(1)
            .ok_or(PDFToolkitError::IdSpaceExhausted)?;
        self.state.last_id.set(next);
        Ok(ObjectId::new(next))
    }

    /// Highest id handed out so far, [`ObjectId::NULL`] if none
    pub fn last_id(&self) -> ObjectId {
        ObjectId::new(self.state.last_id.get())
    }

    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Create an object with an explicit tag.
    ///
    /// Streams are always indirect. Indirect objects are recorded in the
    /// registry but receive their id only when first referenced or exported.
    pub fn create(
        &self,
        tag: ObjectType,
        body: Body,
        linkage: LinkageKind,
    ) -> PDFToolkitResult<Handle> {
        if tag.is_kind_of(ObjectType::Stream) && linkage == LinkageKind::Direct {
            return Err(PDFToolkitError::unsupported("stream objects must be indirect"));
        }

        let object = Rc::new(Object::new(tag, body, linkage, Rc::downgrade(&self.state))?);
        if linkage == LinkageKind::Indirect {
            self.state.registered.borrow_mut().push(Rc::downgrade(&object));
            trace!("Registered indirect {} object", tag);
        }
        Ok(Handle::attach(object))
    }

    /// Direct object of the body's own kind
    pub fn direct(&self, body: impl Into<Body>) -> PDFToolkitResult<Handle> {
        let body = body.into();
        self.create(body.base_type(), body, LinkageKind::Direct)
    }

    /// Indirect object of the body's own kind
    pub fn indirect(&self, body: impl Into<Body>) -> PDFToolkitResult<Handle> {
        let body = body.into();
        self.create(body.base_type(), body, LinkageKind::Indirect)
    }

    pub fn new_dictionary(&self, linkage: LinkageKind) -> PDFToolkitResult<Handle> {
        self.create(ObjectType::Dictionary, Body::Dictionary(Dictionary::new()), linkage)
    }

    pub fn new_array(&self, items: Vec<Handle>, linkage: LinkageKind) -> PDFToolkitResult<Handle> {
        self.create(ObjectType::Array, Body::Array(items), linkage)
    }

    /// Indirect stream holding `data` unencoded
    pub fn new_stream(&self, data: Vec<u8>) -> PDFToolkitResult<Handle> {
        self.create(ObjectType::Stream, Body::Stream(Stream::new(data)), LinkageKind::Indirect)
    }

    /// Live indirect objects in creation order.
    ///
    /// Entries whose object has been released are pruned.
    pub fn indirect_objects(&self) -> Vec<Handle> {
        let mut registered = self.state.registered.borrow_mut();
        registered.retain(|weak| weak.strong_count() > 0);
        registered
            .iter()
            .filter_map(Weak::upgrade)
            .map(Handle::attach)
            .collect()
    }

    /// Write every live indirect object as a definition.
    ///
    /// Returns `(id, offset)` pairs sorted by id, offsets as reported by
    /// the sink before each definition.
    pub fn export_objects(
        &self,
        sink: &mut dyn ByteSink,
        version: PdfVersion,
    ) -> PDFToolkitResult<Vec<(ObjectId, u64)>> {
        let objects = self.indirect_objects();
        let mut offsets = Vec::with_capacity(objects.len());

        for handle in &objects {
            let object = handle.object()?;
            let id = object.ensure_id()?;
            offsets.push((id, sink.tell()?));
            object.export_as_definition(sink, version)?;
            sink.put_string("\r\n")?;
        }

        offsets.sort_by_key(|(id, _)| *id);
        debug!("Exported {} indirect objects", offsets.len());
        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn test_ids_are_lazy_and_monotonic() -> PDFToolkitResult<()> {
        let document = Document::new();
        let a = document.indirect(1i64)?;
        let b = document.indirect(2i64)?;
        assert_eq!(document.last_id(), ObjectId::NULL);

        // First reference decides the order
        assert_eq!(b.object()?.ensure_id()?, ObjectId::new(1));
        assert_eq!(a.object()?.ensure_id()?, ObjectId::new(2));
        assert_eq!(document.last_id(), ObjectId::new(2));
        Ok(())
    }

    #[test]
    fn test_ids_are_not_reused_after_release() -> PDFToolkitResult<()> {
        let document = Document::new();
        let first = document.indirect(1i64)?;
        first.object()?.ensure_id()?;
        drop(first);

        let second = document.indirect(2i64)?;
        assert_eq!(second.object()?.ensure_id()?, ObjectId::new(2));
        Ok(())
    }

    #[test]
    fn test_id_space_exhaustion() {
        let document = Document::new();
        document.state.last_id.set(u32::MAX);
        assert!(matches!(document.next_id(), Err(PDFToolkitError::IdSpaceExhausted)));
        assert_eq!(document.last_id(), ObjectId::new(u32::MAX));
    }

    #[test]
    fn test_registry_does_not_own() -> PDFToolkitResult<()> {
        let document = Document::new();
        let kept = document.indirect(Body::name("Kept"))?;
        let dropped = document.indirect(Body::name("Dropped"))?;
        let _direct = document.direct(Body::name("Inline"))?;
        assert_eq!(document.indirect_objects().len(), 2);

        drop(dropped);
        let live = document.indirect_objects();
        assert_eq!(live, vec![kept.clone()]);
        assert_eq!(kept.ref_count(), 2);
        Ok(())
    }

    #[test]
    fn test_streams_must_be_indirect() {
        let document = Document::new();
        let result = document.create(ObjectType::Stream, Body::Stream(Stream::new(Vec::new())), LinkageKind::Direct);
        assert!(matches!(result, Err(PDFToolkitError::UnsupportedFeature(_))));
    }

    #[test]
    fn test_export_objects_reports_offsets() -> PDFToolkitResult<()> {
        let document = Document::new();
        let answer = document.indirect(42i64)?;
        let list = document.new_array(vec![answer.clone()], LinkageKind::Indirect)?;

        let mut sink = Cursor::new(Vec::new());
        let offsets = document.export_objects(&mut sink, PdfVersion::Pdf17)?;
        let text = String::from_utf8_lossy(sink.get_ref()).into_owned();

        assert_eq!(text, "1 0 obj\r\n42\r\nendobj\r\n2 0 obj\r\n[1 0 R]\r\nendobj\r\n");
        assert_eq!(offsets, vec![(ObjectId::new(1), 0), (ObjectId::new(2), 21)]);
        drop(list);
        Ok(())
    }

    #[test]
    fn test_objects_outlive_document_handle() -> PDFToolkitResult<()> {
        let document = Document::new();
        let handle = document.indirect(3i64)?;
        let owner = handle.object()?.document().ok_or(PDFToolkitError::DetachedObject)?;
        assert!(owner.ptr_eq(&document));
        Ok(())
    }
}
