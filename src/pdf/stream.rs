//! PDF stream object implementation

use log::{debug, trace};

use crate::error::{PDFToolkitError, PDFToolkitResult};
use crate::PdfVersion;
use super::filter::check_version;
use super::{ByteSink, Dictionary, Filter, FilterContext, Handle, ObjectType};

/// Keys the stream maintains itself
const RESERVED_KEYS: [&str; 3] = ["Length", "Filter", "DecodeParms"];

/// Which payload forms a stream currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Raw bytes only; encoding is pending
    Raw,
    /// Encoded bytes only
    Encoded,
    /// Raw bytes and their current encoding
    Both,
}

#[derive(Debug)]
enum Payload {
    Raw(Vec<u8>),
    Encoded(Vec<u8>),
    Both { raw: Vec<u8>, encoded: Vec<u8> },
}

/// A filter in the chain with its optional DecodeParms dictionary
#[derive(Debug, Clone)]
pub struct FilterEntry {
    pub filter: Filter,
    pub params: Option<Handle>,
}

impl FilterEntry {
    /// Parameters as written to `/DecodeParms`; an empty dictionary counts as none
    fn written_params(&self) -> Option<&Handle> {
        self.params
            .as_ref()
            .filter(|params| params.len().map_or(true, |len| len > 0))
    }
}

/// PDF stream object
#[derive(Debug)]
pub struct Stream {
    /// Stream dictionary
    dictionary: Dictionary,
    payload: Payload,
    /// Filters in encode order
    filters: Vec<FilterEntry>,
}

impl Stream {
    /// Create a stream holding `data` unencoded
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            dictionary: Dictionary::new(),
            payload: Payload::Raw(data),
            filters: Vec::new(),
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn state(&self) -> StreamState {
        match self.payload {
            Payload::Raw(_) => StreamState::Raw,
            Payload::Encoded(_) => StreamState::Encoded,
            Payload::Both { .. } => StreamState::Both,
        }
    }

    /// Raw payload, `None` until encoded bytes have been decoded
    pub fn data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Raw(raw) | Payload::Both { raw, .. } => Some(raw),
            Payload::Encoded(_) => None,
        }
    }

    /// Encoded payload, `None` while encoding is pending
    pub fn encoded_data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Encoded(encoded) | Payload::Both { encoded, .. } => Some(encoded),
            Payload::Raw(_) => None,
        }
    }

    /// Replace the raw payload
    pub fn set_data(&mut self, data: Vec<u8>) {
        trace!("Stream raw payload set to {} bytes", data.len());
        self.payload = Payload::Raw(data);
    }

    /// Install bytes already encoded with the current chain
    pub fn set_encoded_data(&mut self, data: Vec<u8>) {
        self.set_length(data.len());
        self.payload = Payload::Encoded(data);
    }

    pub fn filters(&self) -> &[FilterEntry] {
        &self.filters
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|entry| entry.filter.name()).collect()
    }

    /// Append a filter.
    ///
    /// The name and parameters are checked before anything changes, so a
    /// failed call leaves the chain and dictionary untouched.
    pub fn add_filter(&mut self, name: &str, params: Option<Handle>) -> PDFToolkitResult<()> {
        let filter = Filter::from_name(name)?;
        let params = params.filter(|p| !p.is_null());
        if let Some(params) = &params {
            if !params.is_kind_of(ObjectType::Dictionary) {
                return Err(PDFToolkitError::type_mismatch(ObjectType::Dictionary, params.object_type()));
            }
        }
        FilterContext::from_params(filter, params.as_ref())?;

        self.materialize_raw()?;
        self.filters.push(FilterEntry { filter, params });
        self.invalidate_encoding();
        self.sync_filter_entries();

        debug!("Added {} to stream, chain is now {:?}", filter, self.filter_names());
        Ok(())
    }

    /// Remove the first filter matching `name`; false if none matched
    pub fn remove_filter(&mut self, name: &str) -> PDFToolkitResult<bool> {
        let Some(index) = self.filters.iter().position(|entry| entry.filter.matches(name)) else {
            return Ok(false);
        };

        self.materialize_raw()?;
        let removed = self.filters.remove(index);
        self.invalidate_encoding();
        self.sync_filter_entries();

        debug!("Removed {} from stream, chain is now {:?}", removed.filter, self.filter_names());
        Ok(true)
    }

    /// Run the chain in declaration order and record the encoded length
    pub fn encode(&mut self) -> PDFToolkitResult<()> {
        let encoded = match &self.payload {
            Payload::Raw(raw) => Self::apply_chain(&self.filters, raw)?,
            Payload::Both { encoded, .. } | Payload::Encoded(encoded) => {
                let len = encoded.len();
                self.set_length(len);
                return Ok(());
            }
        };

        self.set_length(encoded.len());
        self.payload = match std::mem::replace(&mut self.payload, Payload::Encoded(Vec::new())) {
            Payload::Raw(raw) => Payload::Both { raw, encoded },
            other => other,
        };
        Ok(())
    }

    /// Run the chain in reverse to recover the raw payload
    pub fn decode(&mut self) -> PDFToolkitResult<()> {
        let raw = match &self.payload {
            Payload::Encoded(encoded) => Self::reverse_chain(&self.filters, encoded)?,
            Payload::Raw(_) | Payload::Both { .. } => return Ok(()),
        };

        self.payload = match std::mem::replace(&mut self.payload, Payload::Raw(Vec::new())) {
            Payload::Encoded(encoded) => Payload::Both { raw, encoded },
            other => other,
        };
        Ok(())
    }

    /// Make sure encoded bytes exist before the envelope is written
    pub(crate) fn prepare_export(&mut self) -> PDFToolkitResult<()> {
        self.encode()
    }

    /// Set a caller-owned dictionary entry
    pub fn set_entry(&mut self, key: &str, value: Handle) -> PDFToolkitResult<Option<Handle>> {
        Self::check_reserved(key)?;
        Ok(self.dictionary.set(key, value))
    }

    pub fn remove_entry(&mut self, key: &str) -> PDFToolkitResult<Option<Handle>> {
        Self::check_reserved(key)?;
        Ok(self.dictionary.remove(key))
    }

    /// Write `<<dict>>\r\nstream\r\n...\r\nendstream`
    pub fn write_to(&self, sink: &mut dyn ByteSink, version: PdfVersion) -> PDFToolkitResult<()> {
        let encoded = self
            .encoded_data()
            .ok_or_else(|| PDFToolkitError::unsupported("stream payload has not been encoded"))?;
        for entry in &self.filters {
            check_version(entry.filter, version);
        }

        self.dictionary.write_to(sink, version)?;
        sink.put_string("\r\nstream\r\n")?;
        sink.put_bytes(encoded)?;
        sink.put_string("\r\nendstream")
    }

    fn check_reserved(key: &str) -> PDFToolkitResult<()> {
        if RESERVED_KEYS.contains(&key) {
            return Err(PDFToolkitError::unsupported(format!("/{} is maintained by the stream", key)));
        }
        Ok(())
    }

    fn apply_chain(filters: &[FilterEntry], raw: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut data = Vec::new();
        data.try_reserve(raw.len())?;
        data.extend_from_slice(raw);

        for entry in filters {
            data = entry.filter.encode(&data, entry.params.as_ref())?;
        }
        trace!("Encoded {} raw bytes to {}", raw.len(), data.len());
        Ok(data)
    }

    fn reverse_chain(filters: &[FilterEntry], encoded: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut data = Vec::new();
        data.try_reserve(encoded.len())?;
        data.extend_from_slice(encoded);

        for entry in filters.iter().rev() {
            data = entry.filter.decode(&data, entry.params.as_ref())?;
        }
        trace!("Decoded {} encoded bytes to {}", encoded.len(), data.len());
        Ok(data)
    }

    /// Decode with the current chain if only encoded bytes are held
    fn materialize_raw(&mut self) -> PDFToolkitResult<()> {
        if matches!(self.payload, Payload::Encoded(_)) {
            self.decode()?;
        }
        Ok(())
    }

    /// Drop encoded bytes after the chain changed
    fn invalidate_encoding(&mut self) {
        self.payload = match std::mem::replace(&mut self.payload, Payload::Raw(Vec::new())) {
            Payload::Both { raw, .. } | Payload::Raw(raw) => Payload::Raw(raw),
            Payload::Encoded(encoded) => Payload::Encoded(encoded),
        };
    }

    fn set_length(&mut self, len: usize) {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        self.dictionary.set("Length", Handle::from(len));
    }

    /// Rewrite Filter and DecodeParms from the chain
    fn sync_filter_entries(&mut self) {
        match self.filters.as_slice() {
            [] => {
                self.dictionary.remove("Filter");
                self.dictionary.remove("DecodeParms");
            }
            [entry] => {
                self.dictionary.set("Filter", Handle::name(entry.filter.name()));
                match entry.written_params() {
                    Some(params) => self.dictionary.set("DecodeParms", params.clone()),
                    None => self.dictionary.remove("DecodeParms"),
                };
            }
            entries => {
                let names = entries.iter().map(|e| Handle::name(e.filter.name())).collect();
                self.dictionary.set("Filter", Handle::array(names));

                if entries.iter().any(|e| e.written_params().is_some()) {
                    let params = entries
                        .iter()
                        .map(|e| e.written_params().cloned().unwrap_or_default())
                        .collect();
                    self.dictionary.set("DecodeParms", Handle::array(params));
                } else {
                    self.dictionary.remove("DecodeParms");
                }
            }
        }
    }
}
