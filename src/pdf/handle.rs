//! Owning references to objects

use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use log::debug;

use crate::error::{PDFToolkitError, PDFToolkitResult};
use crate::PdfVersion;
use super::{Body, ByteSink, Document, Object, ObjectType, StreamState};

/// Owning reference to an [`Object`], or null.
///
/// Cloning a handle adds an owner; dropping or reassigning it releases
/// one. The object is destroyed inside the release that removes its last
/// owner. Equality is target identity, never content.
#[derive(Clone, Default)]
pub struct Handle(Option<Rc<Object>>);

/// Non-owning reference used for back edges
#[derive(Clone, Default)]
pub struct WeakHandle(Weak<Object>);

impl WeakHandle {
    pub fn upgrade(&self) -> Option<Handle> {
        self.0.upgrade().map(Handle::attach)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(handle) => write!(f, "WeakHandle({:?})", handle),
            None => f.write_str("WeakHandle(released)"),
        }
    }
}

impl Handle {
    pub fn null() -> Self {
        Self(None)
    }

    /// Take over an existing owner without adding one
    pub fn attach(object: Rc<Object>) -> Self {
        Self(Some(object))
    }

    /// Give up this handle's ownership to the caller without releasing it
    pub fn detach(self) -> Option<Rc<Object>> {
        self.0
    }

    pub(crate) fn detached(body: Body) -> Self {
        Self::attach(Rc::new(Object::detached(body)))
    }

    /// Direct name object
    pub fn name(name: &str) -> Self {
        Self::detached(Body::name(name))
    }

    /// Direct literal string object
    pub fn text(text: &str) -> Self {
        Self::detached(Body::text(text))
    }

    /// Direct literal string object from raw bytes
    pub fn string(bytes: &[u8]) -> Self {
        Self::detached(Body::String(bytes.to_vec()))
    }

    /// Direct array object
    pub fn array(items: Vec<Handle>) -> Self {
        Self::detached(Body::Array(items))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn target(&self) -> Option<&Object> {
        self.0.as_deref()
    }

    pub fn object(&self) -> PDFToolkitResult<&Object> {
        self.target().ok_or(PDFToolkitError::NullHandle)
    }

    /// Number of owning handles, zero for null
    pub fn ref_count(&self) -> usize {
        self.0.as_ref().map_or(0, Rc::strong_count)
    }

    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle(self.0.as_ref().map_or_else(Weak::new, Rc::downgrade))
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Tag of the target, `Null` for a null handle
    pub fn object_type(&self) -> ObjectType {
        self.target().map_or(ObjectType::Null, Object::object_type)
    }

    pub fn is_kind_of(&self, tag: ObjectType) -> bool {
        self.target().map_or(tag == ObjectType::Null || tag == ObjectType::Object, |o| o.is_kind_of(tag))
    }

    pub fn is_indirect(&self) -> bool {
        self.target().map_or(false, Object::is_indirect)
    }

    /// Write a back-reference for indirect targets and the content for direct ones
    pub fn export(&self, sink: &mut dyn ByteSink, version: PdfVersion) -> PDFToolkitResult<()> {
        match self.target() {
            None => sink.put_string("null"),
            Some(object) if object.is_indirect() => object.export_as_reference(sink, version),
            Some(object) => object.export_content(sink, version),
        }
    }

    /// Direct, non-owning reference to this indirect object
    pub fn back_reference(&self) -> PDFToolkitResult<Handle> {
        let object = self.object()?;
        if !object.is_indirect() {
            return Err(PDFToolkitError::NotIndirect(object.object_type()));
        }
        Ok(Self::detached(Body::Reference(self.downgrade())))
    }

    /// Follow a back-reference; other objects resolve to themselves
    pub fn resolve(&self) -> PDFToolkitResult<Handle> {
        if let Body::Reference(target) = &*self.object()?.body() {
            return target.upgrade().ok_or(PDFToolkitError::DetachedObject);
        }
        Ok(self.clone())
    }

    pub fn as_integer(&self) -> PDFToolkitResult<i64> {
        match &*self.object()?.body() {
            Body::Integer(value) => Ok(*value),
            _ => Err(self.mismatch(ObjectType::Integer)),
        }
    }

    pub fn as_boolean(&self) -> PDFToolkitResult<bool> {
        match &*self.object()?.body() {
            Body::Boolean(value) => Ok(*value),
            _ => Err(self.mismatch(ObjectType::Boolean)),
        }
    }

    /// Numeric value; integers widen to reals
    pub fn as_real(&self) -> PDFToolkitResult<f64> {
        match &*self.object()?.body() {
            Body::Real(value) => Ok(*value),
            Body::Integer(value) => Ok(*value as f64),
            _ => Err(self.mismatch(ObjectType::Real)),
        }
    }

    pub fn as_name(&self) -> PDFToolkitResult<String> {
        match &*self.object()?.body() {
            Body::Name(name) => Ok(name.clone()),
            _ => Err(self.mismatch(ObjectType::Name)),
        }
    }

    pub fn as_string_bytes(&self) -> PDFToolkitResult<Vec<u8>> {
        match &*self.object()?.body() {
            Body::String(bytes) | Body::HexString(bytes) => Ok(bytes.clone()),
            _ => Err(self.mismatch(ObjectType::String)),
        }
    }

    pub fn as_array(&self) -> PDFToolkitResult<Vec<Handle>> {
        match &*self.object()?.body() {
            Body::Array(items) => Ok(items.clone()),
            _ => Err(self.mismatch(ObjectType::Array)),
        }
    }

    fn mismatch(&self, expected: ObjectType) -> PDFToolkitError {
        PDFToolkitError::type_mismatch(expected, self.object_type())
    }

    /// True if `target` is reachable from this handle over owning edges
    pub(crate) fn reaches(&self, target: &Object) -> bool {
        let mut pending = vec![self.clone()];
        let mut visited = HashSet::new();

        while let Some(handle) = pending.pop() {
            let Some(object) = handle.target() else { continue };
            if std::ptr::eq(object, target) {
                return true;
            }
            if visited.insert(object as *const Object) {
                object.owned_children(&mut pending);
            }
        }
        false
    }

    fn guard_cycle(&self, key: &str, value: &Handle) -> PDFToolkitResult<()> {
        if value.reaches(self.object()?) {
            return Err(PDFToolkitError::CycleDetected(key.to_string()));
        }
        Ok(())
    }

    /// Refuse indirect objects of another document anywhere under `value`
    fn guard_document(&self, key: &str, value: &Handle) -> PDFToolkitResult<()> {
        let Some(document) = self.object()?.document() else {
            return Ok(());
        };
        let foreign = |object: &Object| {
            object.is_indirect()
                && object.document().map_or(false, |owner| !owner.ptr_eq(&document))
        };

        let mut pending = vec![value.clone()];
        let mut visited = HashSet::new();
        while let Some(handle) = pending.pop() {
            let Some(object) = handle.target() else { continue };
            if !visited.insert(object as *const Object) {
                continue;
            }
            let target = match &*object.body() {
                Body::Reference(weak) => weak.upgrade(),
                _ => None,
            };
            let offender = match target.as_ref().and_then(Handle::target) {
                Some(target) if foreign(target) => Some(target.object_type()),
                _ if foreign(object) => Some(object.object_type()),
                _ => None,
            };
            if let Some(tag) = offender {
                debug!("Refusing /{}: {} object belongs to another document", key, tag);
                return Err(PDFToolkitError::ForeignObject(tag));
            }
            object.owned_children(&mut pending);
        }
        Ok(())
    }

    fn guard_insertion(&self, key: &str, value: &Handle) -> PDFToolkitResult<()> {
        self.guard_cycle(key, value)?;
        self.guard_document(key, value)
    }

    /// Insert or overwrite a dictionary (or stream dictionary) entry
    pub fn set(&self, key: &str, value: Handle) -> PDFToolkitResult<()> {
        self.guard_insertion(key, &value)?;
        let object = self.object()?;
        match &mut *object.body_mut() {
            Body::Dictionary(dict) => {
                dict.set(key, value);
                Ok(())
            }
            Body::Stream(stream) => stream.set_entry(key, value).map(|_| ()),
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Dictionary, object.object_type())),
        }
    }

    /// Entry value, `None` if absent
    pub fn get_opt(&self, key: &str) -> PDFToolkitResult<Option<Handle>> {
        let object = self.object()?;
        match &*object.body() {
            Body::Dictionary(dict) => Ok(dict.get(key).cloned()),
            Body::Stream(stream) => Ok(stream.dictionary().get(key).cloned()),
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Dictionary, object.object_type())),
        }
    }

    /// Required entry value
    pub fn get(&self, key: &str) -> PDFToolkitResult<Handle> {
        self.get_opt(key)?
            .ok_or_else(|| PDFToolkitError::KeyNotFound(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> PDFToolkitResult<bool> {
        Ok(self.get_opt(key)?.is_some())
    }

    /// Remove an entry, returning its previous value
    pub fn remove(&self, key: &str) -> PDFToolkitResult<Option<Handle>> {
        let object = self.object()?;
        match &mut *object.body_mut() {
            Body::Dictionary(dict) => Ok(dict.remove(key)),
            Body::Stream(stream) => stream.remove_entry(key),
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Dictionary, object.object_type())),
        }
    }

    pub fn keys(&self) -> PDFToolkitResult<Vec<String>> {
        let object = self.object()?;
        match &*object.body() {
            Body::Dictionary(dict) => Ok(dict.keys().cloned().collect()),
            Body::Stream(stream) => Ok(stream.dictionary().keys().cloned().collect()),
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Dictionary, object.object_type())),
        }
    }

    /// Existing entry, or a child built by `factory` and inserted under `key`
    pub fn get_or_create<F>(&self, key: &str, factory: F) -> PDFToolkitResult<Handle>
    where
        F: FnOnce(&Document) -> PDFToolkitResult<Handle>,
    {
        if let Some(existing) = self.get_opt(key)? {
            return Ok(existing);
        }
        let document = self.object()?.document().ok_or(PDFToolkitError::DetachedObject)?;
        let child = factory(&document)?;
        self.set(key, child.clone())?;
        debug!("Created {} child for /{}", child.object_type(), key);
        Ok(child)
    }

    pub fn get_integer(&self, key: &str) -> PDFToolkitResult<i64> {
        self.get(key)?.as_integer()
    }

    pub fn get_integer_opt(&self, key: &str) -> PDFToolkitResult<Option<i64>> {
        self.get_opt(key)?.map(|value| value.as_integer()).transpose()
    }

    pub fn set_integer(&self, key: &str, value: i64) -> PDFToolkitResult<()> {
        self.set(key, Handle::from(value))
    }

    pub fn get_boolean(&self, key: &str) -> PDFToolkitResult<bool> {
        self.get(key)?.as_boolean()
    }

    pub fn get_boolean_opt(&self, key: &str) -> PDFToolkitResult<Option<bool>> {
        self.get_opt(key)?.map(|value| value.as_boolean()).transpose()
    }

    pub fn set_boolean(&self, key: &str, value: bool) -> PDFToolkitResult<()> {
        self.set(key, Handle::from(value))
    }

    pub fn get_name(&self, key: &str) -> PDFToolkitResult<String> {
        self.get(key)?.as_name()
    }

    pub fn set_name(&self, key: &str, name: &str) -> PDFToolkitResult<()> {
        self.set(key, Handle::name(name))
    }

    /// Append to an array object
    pub fn push(&self, value: Handle) -> PDFToolkitResult<()> {
        self.guard_insertion("[]", &value)?;
        let object = self.object()?;
        match &mut *object.body_mut() {
            Body::Array(items) => {
                items.push(value);
                Ok(())
            }
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Array, object.object_type())),
        }
    }

    /// Number of array items or dictionary entries
    pub fn len(&self) -> PDFToolkitResult<usize> {
        let object = self.object()?;
        match &*object.body() {
            Body::Array(items) => Ok(items.len()),
            Body::Dictionary(dict) => Ok(dict.len()),
            Body::Stream(stream) => Ok(stream.dictionary().len()),
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Array, object.object_type())),
        }
    }

    fn with_stream<R>(
        &self,
        f: impl FnOnce(&mut super::Stream) -> PDFToolkitResult<R>,
    ) -> PDFToolkitResult<R> {
        let object = self.object()?;
        match &mut *object.body_mut() {
            Body::Stream(stream) => f(stream),
            _ => Err(PDFToolkitError::type_mismatch(ObjectType::Stream, object.object_type())),
        }
    }

    /// Append a filter to a stream's chain
    pub fn add_filter(&self, name: &str, params: Option<Handle>) -> PDFToolkitResult<()> {
        if let Some(params) = &params {
            self.guard_insertion("DecodeParms", params)?;
        }
        self.with_stream(|stream| stream.add_filter(name, params))
    }

    /// Remove the first matching filter; false if none matched
    pub fn remove_filter(&self, name: &str) -> PDFToolkitResult<bool> {
        self.with_stream(|stream| stream.remove_filter(name))
    }

    pub fn filter_names(&self) -> PDFToolkitResult<Vec<&'static str>> {
        self.with_stream(|stream| Ok(stream.filter_names()))
    }

    pub fn encode(&self) -> PDFToolkitResult<()> {
        self.with_stream(|stream| stream.encode())
    }

    pub fn decode(&self) -> PDFToolkitResult<()> {
        self.with_stream(|stream| stream.decode())
    }

    pub fn set_data(&self, data: Vec<u8>) -> PDFToolkitResult<()> {
        self.with_stream(|stream| {
            stream.set_data(data);
            Ok(())
        })
    }

    pub fn set_encoded_data(&self, data: Vec<u8>) -> PDFToolkitResult<()> {
        self.with_stream(|stream| {
            stream.set_encoded_data(data);
            Ok(())
        })
    }

    /// Raw payload, `None` while only encoded bytes are held
    pub fn data(&self) -> PDFToolkitResult<Option<Vec<u8>>> {
        self.with_stream(|stream| Ok(stream.data().map(<[u8]>::to_vec)))
    }

    pub fn encoded_data(&self) -> PDFToolkitResult<Option<Vec<u8>>> {
        self.with_stream(|stream| Ok(stream.encoded_data().map(<[u8]>::to_vec)))
    }

    pub fn stream_state(&self) -> PDFToolkitResult<StreamState> {
        self.with_stream(|stream| Ok(stream.state()))
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            None => f.write_str("Handle(null)"),
            Some(object) if object.is_indirect() => {
                write!(f, "Handle({} {} R, {})", object.id(), super::GENERATION, object.object_type())
            }
            Some(object) => write!(f, "Handle(direct {})", object.object_type()),
        }
    }
}

impl From<bool> for Handle {
    fn from(value: bool) -> Self {
        Self::detached(Body::Boolean(value))
    }
}

impl From<i64> for Handle {
    fn from(value: i64) -> Self {
        Self::detached(Body::Integer(value))
    }
}

impl From<i32> for Handle {
    fn from(value: i32) -> Self {
        Self::detached(Body::Integer(value.into()))
    }
}

impl From<f64> for Handle {
    fn from(value: f64) -> Self {
        Self::detached(Body::Real(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use pretty_assertions::assert_eq;
    use test_log::test;
    use crate::pdf::{Dictionary, LinkageKind};

    fn render(handle: &Handle) -> PDFToolkitResult<String> {
        let mut sink = Cursor::new(Vec::new());
        handle.export(&mut sink, PdfVersion::Pdf17)?;
        Ok(String::from_utf8_lossy(sink.get_ref()).into_owned())
    }

    #[test]
    fn test_clone_adds_owner_and_drop_releases() -> PDFToolkitResult<()> {
        let document = Document::new();
        let first = document.indirect(42i64)?;
        assert_eq!(first.ref_count(), 1);

        let second = first.clone();
        assert_eq!(first.ref_count(), 2);
        assert_eq!(first, second);

        let weak = first.downgrade();
        drop(first);
        assert!(weak.is_alive());
        drop(second);
        assert!(!weak.is_alive());
        Ok(())
    }

    #[test]
    fn test_reassignment_releases_previous_target() -> PDFToolkitResult<()> {
        let document = Document::new();
        let mut handle = document.direct(1i64)?;
        let weak = handle.downgrade();

        handle = document.direct(2i64)?;
        assert!(!weak.is_alive());
        assert_eq!(handle.as_integer()?, 2);
        Ok(())
    }

    #[test]
    fn test_attach_detach_keep_count() -> PDFToolkitResult<()> {
        let document = Document::new();
        let handle = document.direct(true)?;
        let raw = handle.detach().ok_or(PDFToolkitError::NullHandle)?;
        assert_eq!(Rc::strong_count(&raw), 1);

        let handle = Handle::attach(raw);
        assert_eq!(handle.ref_count(), 1);
        Ok(())
    }

    #[test]
    fn test_equality_is_identity() -> PDFToolkitResult<()> {
        let document = Document::new();
        let a = document.direct(5i64)?;
        let b = document.direct(5i64)?;
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(Handle::null(), Handle::null());
        Ok(())
    }

    #[test]
    fn test_export_dispatch() -> PDFToolkitResult<()> {
        let document = Document::new();
        let direct = document.direct(Body::name("Inline"))?;
        let indirect = document.indirect(Body::name("Shared"))?;

        assert_eq!(render(&direct)?, "/Inline");
        assert_eq!(render(&indirect)?, "1 0 R");
        assert_eq!(render(&indirect)?, "1 0 R");
        assert_eq!(render(&Handle::null())?, "null");
        Ok(())
    }

    #[test]
    fn test_required_and_optional_lookup() -> PDFToolkitResult<()> {
        let document = Document::new();
        let dict = document.new_dictionary(LinkageKind::Direct)?;
        dict.set_integer("Count", 3)?;
        dict.set_boolean("Open", false)?;

        assert_eq!(dict.get_integer("Count")?, 3);
        assert_eq!(dict.get_boolean_opt("Open")?, Some(false));
        assert_eq!(dict.get_integer_opt("Missing")?, None);
        assert!(matches!(
            dict.get_integer("Missing"),
            Err(PDFToolkitError::KeyNotFound(key)) if key == "Missing"
        ));
        assert!(matches!(
            dict.get_integer("Open"),
            Err(PDFToolkitError::InvalidObjectType { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_set_overwrites_single_entry() -> PDFToolkitResult<()> {
        let document = Document::new();
        let dict = document.new_dictionary(LinkageKind::Direct)?;
        dict.set_name("Type", "Font")?;
        dict.set_name("Type", "XObject")?;

        assert_eq!(dict.len()?, 1);
        assert_eq!(dict.get_name("Type")?, "XObject");
        Ok(())
    }

    #[test]
    fn test_get_or_create_is_idempotent() -> PDFToolkitResult<()> {
        let document = Document::new();
        let dict = document.new_dictionary(LinkageKind::Direct)?;
        let factory = |doc: &Document| doc.new_dictionary(LinkageKind::Indirect);

        let first = dict.get_or_create("Resources", factory)?;
        let second = dict.get_or_create("Resources", factory)?;
        assert_eq!(first, second);
        assert!(first.is_indirect());
        assert!(first.object()?.id().is_null());
        Ok(())
    }

    #[test]
    fn test_cycles_are_refused() -> PDFToolkitResult<()> {
        let document = Document::new();
        let outer = document.new_dictionary(LinkageKind::Indirect)?;
        let inner = document.new_dictionary(LinkageKind::Direct)?;
        outer.set("Inner", inner.clone())?;

        assert!(matches!(outer.set("Self", outer.clone()), Err(PDFToolkitError::CycleDetected(_))));
        assert!(matches!(inner.set("Outer", outer.clone()), Err(PDFToolkitError::CycleDetected(_))));

        let items = document.new_array(Vec::new(), LinkageKind::Direct)?;
        inner.set("Items", items.clone())?;
        assert!(matches!(items.push(outer.clone()), Err(PDFToolkitError::CycleDetected(_))));

        // Back-references are non-owning
        inner.set("Parent", outer.back_reference()?)?;
        assert_eq!(render(&inner)?, "<</Items [] /Parent 1 0 R>>");
        Ok(())
    }

    #[test]
    fn test_foreign_objects_are_refused() -> PDFToolkitResult<()> {
        let document = Document::new();
        let other = Document::new();
        let page = document.new_dictionary(LinkageKind::Indirect)?;
        let foreign = other.indirect(99i64)?;

        assert!(matches!(
            page.set("Contents", foreign.clone()),
            Err(PDFToolkitError::ForeignObject(ObjectType::Integer))
        ));
        assert!(!page.contains_key("Contents")?);

        // Nested inside a free-standing container
        let mut wrapper = Dictionary::new();
        wrapper.set("Value", foreign.clone());
        assert!(matches!(
            page.set("Wrapper", Handle::from(wrapper)),
            Err(PDFToolkitError::ForeignObject(ObjectType::Integer))
        ));

        let kids = document.new_array(Vec::new(), LinkageKind::Direct)?;
        assert!(matches!(kids.push(foreign.back_reference()?), Err(PDFToolkitError::ForeignObject(_))));
        assert_eq!(kids.len()?, 0);

        let stream = document.new_stream(b"abc".to_vec())?;
        let params = other.new_dictionary(LinkageKind::Indirect)?;
        assert!(matches!(
            stream.add_filter("FlateDecode", Some(params)),
            Err(PDFToolkitError::ForeignObject(ObjectType::Dictionary))
        ));
        assert!(stream.filter_names()?.is_empty());

        // Direct objects carry no id and may move between documents
        page.set("Rotate", other.direct(90i64)?)?;
        page.set("Own", document.indirect(1i64)?)?;
        Ok(())
    }

    #[test]
    fn test_back_reference_does_not_own() -> PDFToolkitResult<()> {
        let document = Document::new();
        let target = document.indirect(Body::name("Target"))?;
        let reference = target.back_reference()?;

        assert_eq!(target.ref_count(), 1);
        assert_eq!(reference.resolve()?, target);
        drop(target);
        assert!(matches!(reference.resolve(), Err(PDFToolkitError::DetachedObject)));
        assert_eq!(render(&reference)?, "null");
        Ok(())
    }

    #[test]
    fn test_back_reference_requires_indirect_target() -> PDFToolkitResult<()> {
        let document = Document::new();
        let direct = document.direct(1i64)?;
        assert!(matches!(
            direct.back_reference(),
            Err(PDFToolkitError::NotIndirect(ObjectType::Integer))
        ));
        Ok(())
    }
}
