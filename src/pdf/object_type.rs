//! Type tags and the single-inheritance kind chain

use std::fmt;

/// Type tag of a PDF object.
///
/// The enumeration is closed and append-only: new kinds go at the end so
/// existing discriminants never change. Every tag has at most one parent;
/// [`ObjectType::is_kind_of`] walks that chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ObjectType {
    /// Root of the hierarchy
    Object = 0,
    Null,
    Boolean,
    Integer,
    Real,
    Name,
    String,
    Array,
    Dictionary,
    Stream,
    /// Non-owning back-reference to an indirect object
    Reference,
    Catalog,
    PageTree,
    Page,
    Resources,
    DocumentInfo,
}

impl ObjectType {
    /// Parent tag in the kind chain, `None` for the root
    pub const fn parent(self) -> Option<ObjectType> {
        match self {
            ObjectType::Object => None,
            ObjectType::Null
            | ObjectType::Boolean
            | ObjectType::Integer
            | ObjectType::Real
            | ObjectType::Name
            | ObjectType::String
            | ObjectType::Array
            | ObjectType::Dictionary
            | ObjectType::Reference => Some(ObjectType::Object),
            ObjectType::Stream
            | ObjectType::Catalog
            | ObjectType::PageTree
            | ObjectType::Page
            | ObjectType::Resources
            | ObjectType::DocumentInfo => Some(ObjectType::Dictionary),
        }
    }

    /// True if `tag` is this tag or one of its ancestors
    pub fn is_kind_of(self, tag: ObjectType) -> bool {
        self.ancestors().any(|t| t == tag)
    }

    /// This tag followed by each ancestor up to the root
    pub fn ancestors(self) -> impl Iterator<Item = ObjectType> {
        std::iter::successors(Some(self), |t| t.parent())
    }

    /// Human readable tag name
    pub const fn name(self) -> &'static str {
        match self {
            ObjectType::Object => "Object",
            ObjectType::Null => "Null",
            ObjectType::Boolean => "Boolean",
            ObjectType::Integer => "Integer",
            ObjectType::Real => "Real",
            ObjectType::Name => "Name",
            ObjectType::String => "String",
            ObjectType::Array => "Array",
            ObjectType::Dictionary => "Dictionary",
            ObjectType::Stream => "Stream",
            ObjectType::Reference => "Reference",
            ObjectType::Catalog => "Catalog",
            ObjectType::PageTree => "PageTree",
            ObjectType::Page => "Page",
            ObjectType::Resources => "Resources",
            ObjectType::DocumentInfo => "DocumentInfo",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
