//! PDF dictionary implementation

use indexmap::IndexMap;
use indexmap::map::Iter;

use crate::error::PDFToolkitResult;
use crate::PdfVersion;
use super::object::write_name;
use super::{Body, ByteSink, Handle};

/// Key to value map of a dictionary object.
///
/// Entries keep insertion order so output is reproducible. Values are
/// owning handles; a key holds at most one value.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: IndexMap<String, Handle>,
}

impl Dictionary {
    /// Create new dictionary
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get value by key
    pub fn get(&self, key: &str) -> Option<&Handle> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set value, returning the one it replaces
    pub fn set(&mut self, key: &str, value: Handle) -> Option<Handle> {
        self.entries.insert(key.to_string(), value)
    }

    /// Remove an entry, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<Handle> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Handle> {
        self.entries.values()
    }

    pub fn iter(&self) -> Iter<'_, String, Handle> {
        self.entries.iter()
    }

    /// Get integer value
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|value| value.as_integer().ok())
    }

    /// Get boolean value
    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|value| value.as_boolean().ok())
    }

    /// Get name value
    pub fn get_name(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|value| value.as_name().ok())
    }

    /// Write `<</Key value ...>>`
    pub fn write_to(&self, sink: &mut dyn ByteSink, version: PdfVersion) -> PDFToolkitResult<()> {
        sink.put_string("<<")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                sink.put_byte(b' ')?;
            }
            write_name(sink, key)?;
            sink.put_byte(b' ')?;
            value.export(sink, version)?;
        }
        sink.put_string(">>")
    }
}

impl From<Dictionary> for Handle {
    fn from(dict: Dictionary) -> Self {
        Handle::detached(Body::Dictionary(dict))
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a String, &'a Handle);
    type IntoIter = Iter<'a, String, Handle>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
