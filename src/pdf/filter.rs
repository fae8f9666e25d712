//! PDF stream filters
//! License: MIT

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, trace, warn};

use crate::error::{PDFToolkitError, PDFToolkitResult};
use crate::PdfVersion;
use super::{Handle, PredictorParams};

const MAX_LZW_BITS: u32 = 12;
const LZW_TABLE_LIMIT: usize = 1 << MAX_LZW_BITS;
const LZW_CLEAR_CODE: u16 = 256;
const LZW_EOD_CODE: u16 = 257;
const LZW_FIRST_CODE: usize = 258;
const RUN_LENGTH_EOD: u8 = 128;

/// Stream filters this crate can both encode and decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    LZWDecode,
    FlateDecode,
    RunLengthDecode,
}

/// Per-filter settings read from a DecodeParms dictionary
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub predictor: Option<PredictorParams>,
    pub compression_level: u32,
    pub early_change: bool,
}

impl Default for FilterContext {
    fn default() -> Self {
        Self {
            predictor: None,
            compression_level: 6,
            early_change: true,
        }
    }
}

impl FilterContext {
    /// Read the parameters that apply to `filter`; absent keys take PDF defaults
    pub fn from_params(filter: Filter, params: Option<&Handle>) -> PDFToolkitResult<Self> {
        let mut ctx = FilterContext::default();
        let Some(params) = params.filter(|p| !p.is_null()) else {
            return Ok(ctx);
        };

        if filter.supports_predictor() {
            let predictor = params.get_integer_opt("Predictor")?.unwrap_or(1);
            if predictor != 1 {
                let predictor = PredictorParams {
                    predictor: u8::try_from(predictor)
                        .map_err(|_| PDFToolkitError::unsupported(format!("Predictor {}", predictor)))?,
                    colors: positive(params.get_integer_opt("Colors")?.unwrap_or(1), "Colors")?,
                    bits_per_component: positive(
                        params.get_integer_opt("BitsPerComponent")?.unwrap_or(8),
                        "BitsPerComponent",
                    )?,
                    columns: positive(params.get_integer_opt("Columns")?.unwrap_or(1), "Columns")?,
                };
                predictor.validate()?;
                ctx.predictor = Some(predictor);
            }
        }

        match filter {
            Filter::FlateDecode => {
                if let Some(level) = params.get_integer_opt("Level")? {
                    ctx.compression_level = level.clamp(0, 9) as u32;
                }
            }
            Filter::LZWDecode => {
                ctx.early_change = params.get_integer_opt("EarlyChange")?.unwrap_or(1) != 0;
            }
            _ => {}
        }

        Ok(ctx)
    }
}

fn positive(value: i64, key: &str) -> PDFToolkitResult<usize> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| PDFToolkitError::unsupported(format!("{} {}", key, value)))
}

impl Filter {
    /// Resolve a filter name or its inline-image abbreviation
    pub fn from_name(name: &str) -> PDFToolkitResult<Self> {
        let filter = match name {
            "ASCIIHexDecode" | "AHx" => Filter::ASCIIHexDecode,
            "FlateDecode" | "Fl" => Filter::FlateDecode,
            "ASCII85Decode" | "A85" if cfg!(feature = "all-filters") => Filter::ASCII85Decode,
            "LZWDecode" | "LZW" if cfg!(feature = "all-filters") => Filter::LZWDecode,
            "RunLengthDecode" | "RL" if cfg!(feature = "all-filters") => Filter::RunLengthDecode,
            "DCTDecode" | "DCT" | "CCITTFaxDecode" | "CCF" | "JBIG2Decode" | "JPXDecode" => {
                return Err(PDFToolkitError::unsupported(format!("{} image codec", name)));
            }
            "Crypt" => return Err(PDFToolkitError::unsupported("Crypt filter")),
            _ => return Err(PDFToolkitError::UnsupportedFilter(name.to_string())),
        };
        Ok(filter)
    }

    /// Canonical filter name
    pub fn name(&self) -> &'static str {
        match self {
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::LZWDecode => "LZWDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
        }
    }

    /// True if `name` is this filter's full name or abbreviation
    pub fn matches(&self, name: &str) -> bool {
        Filter::from_name(name).map_or(false, |f| f == *self)
    }

    /// Earliest file version that defines this filter
    pub fn min_version(&self) -> PdfVersion {
        match self {
            Filter::FlateDecode => PdfVersion::Pdf12,
            _ => PdfVersion::Pdf10,
        }
    }

    pub fn supports_predictor(&self) -> bool {
        matches!(self, Filter::FlateDecode | Filter::LZWDecode)
    }

    /// Decode data using this filter
    pub fn decode(&self, data: &[u8], params: Option<&Handle>) -> PDFToolkitResult<Vec<u8>> {
        let ctx = FilterContext::from_params(*self, params)?;
        trace!("Decoding {} bytes with {}", data.len(), self);

        let result = match self {
            Filter::ASCIIHexDecode => self.decode_ascii_hex(data)?,
            Filter::ASCII85Decode => self.decode_ascii85(data)?,
            Filter::LZWDecode => self.decode_lzw(data, &ctx)?,
            Filter::FlateDecode => self.decode_flate(data)?,
            Filter::RunLengthDecode => self.decode_run_length(data)?,
        };

        match ctx.predictor {
            Some(predictor) => predictor.decode(&result),
            None => Ok(result),
        }
    }

    /// Encode data using this filter
    pub fn encode(&self, data: &[u8], params: Option<&Handle>) -> PDFToolkitResult<Vec<u8>> {
        let ctx = FilterContext::from_params(*self, params)?;
        trace!("Encoding {} bytes with {}", data.len(), self);

        let predicted;
        let data = match ctx.predictor.as_ref() {
            Some(predictor) => {
                predicted = predictor.encode(data)?;
                predicted.as_slice()
            }
            None => data,
        };

        match self {
            Filter::ASCIIHexDecode => self.encode_ascii_hex(data),
            Filter::ASCII85Decode => self.encode_ascii85(data),
            Filter::LZWDecode => self.encode_lzw(data, &ctx),
            Filter::FlateDecode => self.encode_flate(data, &ctx),
            Filter::RunLengthDecode => self.encode_run_length(data),
        }
    }

    // ASCIIHex Implementation
    fn decode_ascii_hex(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut digits = Vec::new();
        digits.try_reserve(data.len() + 1)?;

        for &byte in data {
            match byte {
                b'>' => break,
                b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => continue,
                _ => digits.push(byte),
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }

        hex::decode(&digits).map_err(|e| PDFToolkitError::corrupt("ASCIIHexDecode", e.to_string()))
    }

    fn encode_ascii_hex(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() * 2 + 1)?;
        output.extend_from_slice(hex::encode_upper(data).as_bytes());
        output.push(b'>');
        Ok(output)
    }

    // ASCII85 Implementation
    fn decode_ascii85(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() / 5 * 4 + 4)?;
        let mut group = [0u8; 5];
        let mut count = 0;
        let mut bytes = data.iter().copied();

        while let Some(byte) = bytes.next() {
            match byte {
                b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => continue,
                b'~' => {
                    if bytes.next() != Some(b'>') {
                        return Err(PDFToolkitError::corrupt("ASCII85Decode", "'~' not followed by '>'"));
                    }
                    break;
                }
                b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => {
                    return Err(PDFToolkitError::corrupt("ASCII85Decode", "'z' inside a group"));
                }
                b'!'..=b'u' => {
                    group[count] = byte - b'!';
                    count += 1;
                    if count == 5 {
                        output.extend_from_slice(&ascii85_group(&group)?);
                        count = 0;
                    }
                }
                _ => {
                    return Err(PDFToolkitError::corrupt(
                        "ASCII85Decode",
                        format!("Invalid ASCII85 character: 0x{:02X}", byte),
                    ));
                }
            }
        }

        match count {
            0 => {}
            1 => return Err(PDFToolkitError::corrupt("ASCII85Decode", "Final group has one character")),
            _ => {
                group[count..].fill(b'u' - b'!');
                let decoded = ascii85_group(&group)?;
                output.extend_from_slice(&decoded[..count - 1]);
            }
        }

        Ok(output)
    }

    fn encode_ascii85(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() / 4 * 5 + 7)?;
        let mut buffer = [0u8; 4];

        for chunk in data.chunks(4) {
            buffer.fill(0);
            buffer[..chunk.len()].copy_from_slice(chunk);
            let mut value = u32::from_be_bytes(buffer);

            if value == 0 && chunk.len() == 4 {
                output.push(b'z');
                continue;
            }

            let mut digits = [0u8; 5];
            for digit in digits.iter_mut().rev() {
                *digit = (value % 85) as u8 + b'!';
                value /= 85;
            }
            output.extend_from_slice(&digits[..chunk.len() + 1]);
        }

        output.extend_from_slice(b"~>");
        Ok(output)
    }

    // RunLength Implementation
    fn decode_run_length(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() * 2)?;
        let mut i = 0;

        while i < data.len() {
            let length = data[i];
            i += 1;

            match length {
                RUN_LENGTH_EOD => break,
                0..=127 => {
                    let count = length as usize + 1;
                    let literal = data.get(i..i + count).ok_or_else(|| {
                        PDFToolkitError::corrupt("RunLengthDecode", "Literal run past end of data")
                    })?;
                    output.extend_from_slice(literal);
                    i += count;
                }
                _ => {
                    let byte = *data.get(i).ok_or_else(|| {
                        PDFToolkitError::corrupt("RunLengthDecode", "Repeat run past end of data")
                    })?;
                    let count = 257 - length as usize;
                    output.extend(std::iter::repeat(byte).take(count));
                    i += 1;
                }
            }
        }

        Ok(output)
    }

    fn encode_run_length(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() + data.len() / 128 + 2)?;
        let mut i = 0;

        while i < data.len() {
            let mut run = 1;
            while i + run < data.len() && data[i + run] == data[i] && run < 128 {
                run += 1;
            }

            if run >= 2 {
                output.push((257 - run) as u8);
                output.push(data[i]);
                i += run;
                continue;
            }

            // Literal until the next repeat or 128 bytes
            let start = i;
            i += 1;
            while i < data.len() && i - start < 128 {
                if i + 1 < data.len() && data[i] == data[i + 1] {
                    break;
                }
                i += 1;
            }
            output.push((i - start - 1) as u8);
            output.extend_from_slice(&data[start..i]);
        }

        output.push(RUN_LENGTH_EOD);
        Ok(output)
    }

    // LZW Implementation
    fn decode_lzw(&self, data: &[u8], ctx: &FilterContext) -> PDFToolkitResult<Vec<u8>> {
        LzwDecoder::new(ctx.early_change).decode(data)
    }

    fn encode_lzw(&self, data: &[u8], ctx: &FilterContext) -> PDFToolkitResult<Vec<u8>> {
        LzwEncoder::new(ctx.early_change).encode(data)
    }

    // Flate Implementation
    fn decode_flate(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut output = Vec::new();
        output.try_reserve(data.len() * 2)?;

        decoder
            .read_to_end(&mut output)
            .map_err(|e| PDFToolkitError::corrupt("FlateDecode", e.to_string()))?;
        Ok(output)
    }

    fn encode_flate(&self, data: &[u8], ctx: &FilterContext) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() / 2 + 16)?;
        let mut encoder = ZlibEncoder::new(output, Compression::new(ctx.compression_level));

        encoder
            .write_all(data)
            .map_err(|e| PDFToolkitError::CompressionError(e.to_string()))?;
        let output = encoder
            .finish()
            .map_err(|e| PDFToolkitError::CompressionError(e.to_string()))?;

        debug!("Flate compressed {} bytes to {}", data.len(), output.len());
        Ok(output)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn ascii85_group(group: &[u8; 5]) -> PDFToolkitResult<[u8; 4]> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + digit as u64);
    let value = u32::try_from(value)
        .map_err(|_| PDFToolkitError::corrupt("ASCII85Decode", "Group value exceeds 32 bits"))?;
    Ok(value.to_be_bytes())
}

/// Code width for a table of `size` entries
fn lzw_code_bits(size: usize, early_change: bool) -> u32 {
    let n = size + usize::from(early_change);
    (usize::BITS - n.leading_zeros()).clamp(9, MAX_LZW_BITS)
}

/// LZW Decoder Implementation
struct LzwDecoder {
    early_change: bool,
    dictionary: LzwDictionary,
}

impl LzwDecoder {
    fn new(early_change: bool) -> Self {
        Self {
            early_change,
            dictionary: LzwDictionary::new(),
        }
    }

    fn decode(&mut self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() * 2)?;
        let mut bit_reader = BitReader::new(data);
        let mut prev_code: Option<usize> = None;

        loop {
            let bits = lzw_code_bits(self.dictionary.len(), self.early_change);
            let code = match bit_reader.read_code(bits) {
                None => break,
                Some(code) => code,
            };

            match code {
                LZW_CLEAR_CODE => {
                    self.dictionary.reset();
                    prev_code = None;
                }
                LZW_EOD_CODE => break,
                code => {
                    let code = code as usize;
                    let sequence = match (self.dictionary.get_sequence(code), prev_code) {
                        (Some(seq), _) => seq.to_vec(),
                        (None, Some(prev)) if code == self.dictionary.len() => {
                            let mut seq = self.dictionary.sequence(prev)?.to_vec();
                            seq.push(seq[0]);
                            seq
                        }
                        _ => {
                            return Err(PDFToolkitError::corrupt(
                                "LZWDecode",
                                format!("Invalid LZW code {}", code),
                            ));
                        }
                    };

                    output.try_reserve(sequence.len())?;
                    output.extend_from_slice(&sequence);

                    if let Some(prev) = prev_code {
                        if self.dictionary.len() < LZW_TABLE_LIMIT {
                            let mut new_seq = self.dictionary.sequence(prev)?.to_vec();
                            new_seq.push(sequence[0]);
                            self.dictionary.add_sequence(new_seq);
                        }
                    }
                    prev_code = Some(code);
                }
            }
        }

        Ok(output)
    }
}

/// LZW Encoder Implementation
struct LzwEncoder {
    early_change: bool,
    dictionary: LzwDictionary,
    /// Codes written since the last clear code
    emitted: usize,
}

impl LzwEncoder {
    fn new(early_change: bool) -> Self {
        Self {
            early_change,
            dictionary: LzwDictionary::new(),
            emitted: 0,
        }
    }

    /// Width the decoder will read the next code with; its table trails ours by one entry
    fn current_code_bits(&self) -> u32 {
        lzw_code_bits(LZW_FIRST_CODE + self.emitted.saturating_sub(1), self.early_change)
    }

    fn emit(&mut self, code: u16, bit_writer: &mut BitWriter, output: &mut Vec<u8>) {
        bit_writer.write_code(code, self.current_code_bits(), output);
        self.emitted += 1;
    }

    fn encode(&mut self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let mut output = Vec::new();
        output.try_reserve(data.len() + 4)?;
        let mut bit_writer = BitWriter::new();
        let mut current_sequence: Vec<u8> = Vec::new();

        bit_writer.write_code(LZW_CLEAR_CODE, self.current_code_bits(), &mut output);

        for &byte in data {
            current_sequence.push(byte);
            if self.dictionary.has_sequence(&current_sequence) {
                continue;
            }

            let prefix = &current_sequence[..current_sequence.len() - 1];
            let code = self.dictionary.code_of(prefix)?;
            self.emit(code, &mut bit_writer, &mut output);
            self.dictionary.add_sequence(current_sequence.clone());

            if self.dictionary.len() + usize::from(self.early_change) >= LZW_TABLE_LIMIT {
                bit_writer.write_code(LZW_CLEAR_CODE, self.current_code_bits(), &mut output);
                self.dictionary.reset();
                self.emitted = 0;
            }

            current_sequence.clear();
            current_sequence.push(byte);
        }

        if !current_sequence.is_empty() {
            let code = self.dictionary.code_of(&current_sequence)?;
            self.emit(code, &mut bit_writer, &mut output);
        }

        bit_writer.write_code(LZW_EOD_CODE, self.current_code_bits(), &mut output);
        bit_writer.flush(&mut output);

        Ok(output)
    }
}

/// LZW Dictionary Implementation
#[derive(Debug)]
struct LzwDictionary {
    entries: HashMap<Vec<u8>, u16>,
    sequences: Vec<Vec<u8>>,
}

impl LzwDictionary {
    fn new() -> Self {
        let mut dict = Self {
            entries: HashMap::with_capacity(LZW_TABLE_LIMIT),
            sequences: Vec::with_capacity(LZW_TABLE_LIMIT),
        };
        dict.reset();
        dict
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.sequences.clear();

        for i in 0..256u16 {
            let sequence = vec![i as u8];
            self.entries.insert(sequence.clone(), i);
            self.sequences.push(sequence);
        }

        // Clear and EOD slots
        self.sequences.push(Vec::new());
        self.sequences.push(Vec::new());
    }

    fn len(&self) -> usize {
        self.sequences.len()
    }

    fn add_sequence(&mut self, sequence: Vec<u8>) {
        if self.sequences.len() >= LZW_TABLE_LIMIT {
            return;
        }
        self.entries.insert(sequence.clone(), self.sequences.len() as u16);
        self.sequences.push(sequence);
    }

    fn get_sequence(&self, code: usize) -> Option<&[u8]> {
        self.sequences
            .get(code)
            .map(|v| v.as_slice())
            .filter(|seq| !seq.is_empty())
    }

    fn sequence(&self, code: usize) -> PDFToolkitResult<&[u8]> {
        self.get_sequence(code).ok_or_else(|| {
            PDFToolkitError::corrupt("LZWDecode", format!("Undefined LZW code {}", code))
        })
    }

    fn code_of(&self, sequence: &[u8]) -> PDFToolkitResult<u16> {
        self.entries.get(sequence).copied().ok_or_else(|| {
            PDFToolkitError::CompressionError("LZW table lost a known prefix".to_string())
        })
    }

    fn has_sequence(&self, sequence: &[u8]) -> bool {
        self.entries.contains_key(sequence)
    }
}

/// MSB-first bit reader
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_buffer: u32,
    bits_in_buffer: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    /// Next code, or `None` once fewer than `bits` bits remain
    fn read_code(&mut self, bits: u32) -> Option<u16> {
        while self.bits_in_buffer < bits {
            let byte = *self.data.get(self.byte_pos)?;
            self.bit_buffer = (self.bit_buffer << 8) | byte as u32;
            self.bits_in_buffer += 8;
            self.byte_pos += 1;
        }

        let shift = self.bits_in_buffer - bits;
        let code = (self.bit_buffer >> shift) & ((1 << bits) - 1);
        self.bit_buffer &= (1 << shift) - 1;
        self.bits_in_buffer = shift;
        Some(code as u16)
    }
}

/// MSB-first bit writer
struct BitWriter {
    bit_buffer: u32,
    bits_in_buffer: u32,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    fn write_code(&mut self, code: u16, bits: u32, output: &mut Vec<u8>) {
        self.bit_buffer = (self.bit_buffer << bits) | code as u32;
        self.bits_in_buffer += bits;

        while self.bits_in_buffer >= 8 {
            output.push((self.bit_buffer >> (self.bits_in_buffer - 8)) as u8);
            self.bits_in_buffer -= 8;
        }
        self.bit_buffer &= (1 << self.bits_in_buffer) - 1;
    }

    fn flush(&mut self, output: &mut Vec<u8>) {
        if self.bits_in_buffer > 0 {
            output.push((self.bit_buffer << (8 - self.bits_in_buffer)) as u8);
            self.bit_buffer = 0;
            self.bits_in_buffer = 0;
        }
    }
}

/// Warn when a filter is newer than the target file version
pub(crate) fn check_version(filter: Filter, version: PdfVersion) {
    if version < filter.min_version() {
        warn!(
            "{} requires PDF {} but output targets PDF {}",
            filter,
            filter.min_version(),
            version
        );
    }
}
