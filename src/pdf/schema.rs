//! Schema-driven typed dictionaries
//!
//! A typed dictionary is a [`Handle`] to a dictionary object whose tag
//! descends from `Dictionary`, plus a static table of the keys it knows.
//! Each key is required, optional, or created on first read. All typed
//! getters and setters go through [`read_entry`] and [`write_entry`], so
//! presence and kind rules live in one place.
//!
//! Wrappers are declared with [`pdf_dictionary!`](crate::pdf_dictionary).

use std::fmt;
use log::trace;

use crate::error::{PDFToolkitError, PDFToolkitResult};
use super::{Body, Dictionary, Document, Handle, LinkageKind, ObjectType};

/// Builds the value for a get-or-create key
pub type DefaultFactory = fn(&Document) -> PDFToolkitResult<Handle>;

/// How a key behaves when it is read and absent
#[derive(Clone, Copy)]
pub enum Presence {
    /// Reading fails with `KeyNotFound`
    Required,
    /// Reading yields `None`
    Optional,
    /// Reading creates, stores and returns a default value
    GetOrCreate(DefaultFactory),
}

impl fmt::Debug for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Required => f.write_str("Required"),
            Presence::Optional => f.write_str("Optional"),
            Presence::GetOrCreate(_) => f.write_str("GetOrCreate"),
        }
    }
}

/// One row of a dictionary schema
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub key: &'static str,
    /// Tag the value must be a kind of
    pub kind: ObjectType,
    pub presence: Presence,
}

/// A handle known to point at an object of a given tag
pub trait TypedObject: Sized {
    const TAG: ObjectType;

    fn from_handle_unchecked(handle: Handle) -> Self;

    fn handle(&self) -> &Handle;

    fn into_handle(self) -> Handle;

    /// Downcast through the tag chain
    fn from_handle(handle: Handle) -> PDFToolkitResult<Self> {
        if !handle.is_kind_of(Self::TAG) || handle.is_null() {
            return Err(PDFToolkitError::type_mismatch(Self::TAG, handle.object_type()));
        }
        Ok(Self::from_handle_unchecked(handle))
    }
}

/// A typed object backed by a dictionary with a fixed key schema
pub trait TypedDictionary: TypedObject {
    /// Value written to `/Type` on creation, if any
    const TYPE_NAME: Option<&'static str>;
    const SCHEMA: &'static [KeySpec];
    /// Linkage used when the object is created as a default child
    const DEFAULT_LINKAGE: LinkageKind = LinkageKind::Indirect;

    /// Fill in entries every new instance starts with
    fn initialize(&self) -> PDFToolkitResult<()> {
        Ok(())
    }

    fn create(document: &Document, linkage: LinkageKind) -> PDFToolkitResult<Self> {
        let handle = document.create(Self::TAG, Body::Dictionary(Dictionary::new()), linkage)?;
        if let Some(type_name) = Self::TYPE_NAME {
            handle.set_name("Type", type_name)?;
        }
        let typed = Self::from_handle_unchecked(handle);
        typed.initialize()?;
        trace!("Created {} dictionary", Self::TAG);
        Ok(typed)
    }

    /// Check required keys are present and every known key has the right kind
    fn validate(&self) -> PDFToolkitResult<()> {
        for spec in Self::SCHEMA {
            match self.handle().get_opt(spec.key)? {
                Some(value) => check_kind(spec, &value)?,
                None if matches!(spec.presence, Presence::Required) => {
                    return Err(PDFToolkitError::KeyNotFound(spec.key.to_string()));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Factory for get-or-create keys holding a typed dictionary
pub fn create_default<T: TypedDictionary>(document: &Document) -> PDFToolkitResult<Handle> {
    T::create(document, T::DEFAULT_LINKAGE).map(TypedObject::into_handle)
}

/// Factory for get-or-create keys holding an empty array
pub fn create_array(document: &Document) -> PDFToolkitResult<Handle> {
    document.new_array(Vec::new(), LinkageKind::Direct)
}

pub fn downcast<T: TypedObject>(handle: Handle) -> PDFToolkitResult<T> {
    T::from_handle(handle)
}

pub fn find_spec(schema: &'static [KeySpec], key: &str) -> PDFToolkitResult<&'static KeySpec> {
    schema
        .iter()
        .find(|spec| spec.key == key)
        .ok_or_else(|| PDFToolkitError::unsupported(format!("/{} is not part of this schema", key)))
}

/// Check a value against the kind a schema row declares
pub fn check_kind(spec: &KeySpec, value: &Handle) -> PDFToolkitResult<()> {
    let accepted = match spec.kind {
        ObjectType::Real => value.is_kind_of(ObjectType::Real) || value.is_kind_of(ObjectType::Integer),
        ObjectType::Reference => value.is_kind_of(ObjectType::Reference) || value.is_indirect(),
        kind => value.is_kind_of(kind),
    };
    if accepted && !value.is_null() {
        Ok(())
    } else {
        Err(PDFToolkitError::type_mismatch(spec.kind, value.object_type()))
    }
}

/// Read `key` following its presence rule
pub fn read_entry(
    handle: &Handle,
    schema: &'static [KeySpec],
    key: &str,
) -> PDFToolkitResult<Option<Handle>> {
    let spec = find_spec(schema, key)?;
    let value = match spec.presence {
        Presence::Required => Some(handle.get(key)?),
        Presence::Optional => handle.get_opt(key)?,
        Presence::GetOrCreate(factory) => Some(handle.get_or_create(key, factory)?),
    };
    if let Some(value) = &value {
        check_kind(spec, value)?;
    }
    Ok(value)
}

/// Store `value` under `key` after checking its kind
pub fn write_entry(
    handle: &Handle,
    schema: &'static [KeySpec],
    key: &str,
    value: Handle,
) -> PDFToolkitResult<()> {
    let spec = find_spec(schema, key)?;
    check_kind(spec, &value)?;
    handle.set(key, value)
}

/// Declare a typed dictionary wrapper.
///
/// ```
/// use pdf_toolkit::pdf_dictionary;
/// use pdf_toolkit::pdf::{Document, LinkageKind};
/// use pdf_toolkit::pdf::schema::TypedDictionary;
///
/// pdf_dictionary! {
///     /// Marked-content reference
///     pub struct MarkedContent: Dictionary, type_name = "MCR" {
///         required "MCID" => mcid, set_mcid: int;
///         optional "Stm" => stream, set_stream: object;
///     }
/// }
///
/// # fn main() -> pdf_toolkit::PDFToolkitResult<()> {
/// let document = Document::new();
/// let mcr = MarkedContent::create(&document, LinkageKind::Direct)?;
/// assert!(mcr.validate().is_err());
/// mcr.set_mcid(3)?;
/// assert_eq!(mcr.mcid()?, 3);
/// assert_eq!(mcr.stream()?, None);
/// # Ok(())
/// # }
/// ```
///
/// Kinds: `int`, `bool`, `real`, `name`, `string`, `array`, `object`,
/// `reference` (stored as a back-reference, read back resolved) or the
/// name of another typed dictionary. Presence is `required`, `optional`
/// or `get_or_create` (typed dictionaries and arrays only).
#[macro_export]
macro_rules! pdf_dictionary {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $tag:ident
            $(, type_name = $type_name:literal)?
            $(, init = $init:path)?
        {
            $( $presence:ident $key:literal => $getter:ident, $setter:ident : $kind:ident; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name($crate::pdf::Handle);

        impl $crate::pdf::schema::TypedObject for $name {
            const TAG: $crate::pdf::ObjectType = $crate::pdf::ObjectType::$tag;

            fn from_handle_unchecked(handle: $crate::pdf::Handle) -> Self {
                Self(handle)
            }

            fn handle(&self) -> &$crate::pdf::Handle {
                &self.0
            }

            fn into_handle(self) -> $crate::pdf::Handle {
                self.0
            }
        }

        impl $crate::pdf::schema::TypedDictionary for $name {
            const TYPE_NAME: Option<&'static str> = $crate::pdf_dictionary!(@type_name $($type_name)?);
            const SCHEMA: &'static [$crate::pdf::schema::KeySpec] = &[
                $(
                    $crate::pdf::schema::KeySpec {
                        key: $key,
                        kind: $crate::pdf_dictionary!(@tag $kind),
                        presence: $crate::pdf_dictionary!(@presence $presence $kind),
                    },
                )*
            ];

            $(
                fn initialize(&self) -> $crate::PDFToolkitResult<()> {
                    $init(self)
                }
            )?
        }

        impl $name {
            $(
                $crate::pdf_dictionary!(@getter $presence $key, $getter, $kind);
                $crate::pdf_dictionary!(@setter $key, $setter, $kind);
            )*
        }
    };

    (@type_name) => { None };
    (@type_name $type_name:literal) => { Some($type_name) };

    (@tag int) => { $crate::pdf::ObjectType::Integer };
    (@tag bool) => { $crate::pdf::ObjectType::Boolean };
    (@tag real) => { $crate::pdf::ObjectType::Real };
    (@tag name) => { $crate::pdf::ObjectType::Name };
    (@tag string) => { $crate::pdf::ObjectType::String };
    (@tag array) => { $crate::pdf::ObjectType::Array };
    (@tag object) => { $crate::pdf::ObjectType::Object };
    (@tag reference) => { $crate::pdf::ObjectType::Reference };
    (@tag $typed:ident) => { <$typed as $crate::pdf::schema::TypedObject>::TAG };

    (@presence required $kind:ident) => { $crate::pdf::schema::Presence::Required };
    (@presence optional $kind:ident) => { $crate::pdf::schema::Presence::Optional };
    (@presence get_or_create array) => {
        $crate::pdf::schema::Presence::GetOrCreate($crate::pdf::schema::create_array)
    };
    (@presence get_or_create $typed:ident) => {
        $crate::pdf::schema::Presence::GetOrCreate($crate::pdf::schema::create_default::<$typed>)
    };

    (@type int) => { i64 };
    (@type bool) => { bool };
    (@type real) => { f64 };
    (@type name) => { String };
    (@type string) => { Vec<u8> };
    (@type array) => { $crate::pdf::Handle };
    (@type object) => { $crate::pdf::Handle };
    (@type reference) => { $crate::pdf::Handle };
    (@type $typed:ident) => { $typed };

    (@param int) => { i64 };
    (@param bool) => { bool };
    (@param real) => { f64 };
    (@param name) => { &str };
    (@param string) => { &[u8] };
    (@param array) => { Vec<$crate::pdf::Handle> };
    (@param object) => { $crate::pdf::Handle };
    (@param reference) => { &$crate::pdf::Handle };
    (@param $typed:ident) => { &$typed };

    (@convert int $value:ident) => { $value.as_integer() };
    (@convert bool $value:ident) => { $value.as_boolean() };
    (@convert real $value:ident) => { $value.as_real() };
    (@convert name $value:ident) => { $value.as_name() };
    (@convert string $value:ident) => { $value.as_string_bytes() };
    (@convert array $value:ident) => { $crate::PDFToolkitResult::Ok($value) };
    (@convert object $value:ident) => { $crate::PDFToolkitResult::Ok($value) };
    (@convert reference $value:ident) => { $value.resolve() };
    (@convert $typed:ident $value:ident) => {
        <$typed as $crate::pdf::schema::TypedObject>::from_handle($value)
    };

    (@into int $value:ident) => { $crate::PDFToolkitResult::Ok($crate::pdf::Handle::from($value)) };
    (@into bool $value:ident) => { $crate::PDFToolkitResult::Ok($crate::pdf::Handle::from($value)) };
    (@into real $value:ident) => { $crate::PDFToolkitResult::Ok($crate::pdf::Handle::from($value)) };
    (@into name $value:ident) => { $crate::PDFToolkitResult::Ok($crate::pdf::Handle::name($value)) };
    (@into string $value:ident) => { $crate::PDFToolkitResult::Ok($crate::pdf::Handle::string($value)) };
    (@into array $value:ident) => { $crate::PDFToolkitResult::Ok($crate::pdf::Handle::array($value)) };
    (@into object $value:ident) => { $crate::PDFToolkitResult::Ok($value) };
    (@into reference $value:ident) => { $value.back_reference() };
    (@into $typed:ident $value:ident) => {
        $crate::PDFToolkitResult::Ok(<$typed as $crate::pdf::schema::TypedObject>::handle($value).clone())
    };

    (@getter optional $key:literal, $getter:ident, $kind:ident) => {
        pub fn $getter(&self) -> $crate::PDFToolkitResult<Option<$crate::pdf_dictionary!(@type $kind)>> {
            let schema = <Self as $crate::pdf::schema::TypedDictionary>::SCHEMA;
            match $crate::pdf::schema::read_entry(&self.0, schema, $key)? {
                Some(value) => $crate::pdf_dictionary!(@convert $kind value).map(Some),
                None => Ok(None),
            }
        }
    };
    (@getter $presence:ident $key:literal, $getter:ident, $kind:ident) => {
        pub fn $getter(&self) -> $crate::PDFToolkitResult<$crate::pdf_dictionary!(@type $kind)> {
            let schema = <Self as $crate::pdf::schema::TypedDictionary>::SCHEMA;
            let value = $crate::pdf::schema::read_entry(&self.0, schema, $key)?
                .ok_or_else(|| $crate::PDFToolkitError::KeyNotFound($key.to_string()))?;
            $crate::pdf_dictionary!(@convert $kind value)
        }
    };

    (@setter $key:literal, $setter:ident, $kind:ident) => {
        pub fn $setter(&self, value: $crate::pdf_dictionary!(@param $kind)) -> $crate::PDFToolkitResult<()> {
            let schema = <Self as $crate::pdf::schema::TypedDictionary>::SCHEMA;
            let value = $crate::pdf_dictionary!(@into $kind value)?;
            $crate::pdf::schema::write_entry(&self.0, schema, $key, value)
        }
    };
}
