//! PNG and TIFF predictors applied around LZW and Flate

use byteorder::{BigEndian, ByteOrder};
use log::trace;

use crate::error::{PDFToolkitError, PDFToolkitResult};

/// Predictor parameters taken from a filter's DecodeParms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

/// PNG row filter tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PngTag {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl PngTag {
    fn from_byte(byte: u8) -> PDFToolkitResult<Self> {
        match byte {
            0 => Ok(PngTag::None),
            1 => Ok(PngTag::Sub),
            2 => Ok(PngTag::Up),
            3 => Ok(PngTag::Average),
            4 => Ok(PngTag::Paeth),
            _ => Err(PDFToolkitError::corrupt(
                "Predictor",
                format!("Invalid PNG row filter tag: {}", byte),
            )),
        }
    }
}

impl PredictorParams {
    /// Check the combination is one this crate can apply
    pub fn validate(&self) -> PDFToolkitResult<()> {
        if !matches!(self.predictor, 1 | 2 | 10..=15) {
            return Err(PDFToolkitError::unsupported(format!("Predictor {}", self.predictor)));
        }
        if self.colors == 0 || self.columns == 0 {
            return Err(PDFToolkitError::unsupported("Predictor with zero Colors or Columns"));
        }
        if !matches!(self.bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(PDFToolkitError::unsupported(format!(
                "BitsPerComponent {}",
                self.bits_per_component
            )));
        }
        if self.predictor == 2 && !matches!(self.bits_per_component, 8 | 16) {
            return Err(PDFToolkitError::unsupported(format!(
                "TIFF predictor with {} bits per component",
                self.bits_per_component
            )));
        }
        self.row_layout()?;
        Ok(())
    }

    /// `(bytes_per_pixel, bytes_per_row)`, refusing sizes that overflow
    fn row_layout(&self) -> PDFToolkitResult<(usize, usize)> {
        let overflow = || PDFToolkitError::unsupported(format!(
            "Predictor row of {} columns x {} colors x {} bits",
            self.columns, self.colors, self.bits_per_component
        ));
        let bits_per_pixel = self
            .colors
            .checked_mul(self.bits_per_component)
            .ok_or_else(overflow)?;
        let bits_per_row = self
            .columns
            .checked_mul(bits_per_pixel)
            .and_then(|bits| bits.checked_add(7))
            .ok_or_else(overflow)?;
        Ok(((bits_per_pixel + 7) / 8, bits_per_row / 8))
    }

    /// Row tag written on encode. Predictor 15 lets the encoder choose; Paeth is used.
    fn png_tag(&self) -> PngTag {
        match self.predictor {
            11 => PngTag::Sub,
            12 => PngTag::Up,
            13 => PngTag::Average,
            14 | 15 => PngTag::Paeth,
            _ => PngTag::None,
        }
    }

    /// Apply the predictor before compression
    pub fn encode(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        self.validate()?;
        trace!("Applying predictor {} to {} bytes", self.predictor, data.len());
        match self.predictor {
            1 => Ok(data.to_vec()),
            2 => self.tiff(data, true),
            _ => self.png_encode(data),
        }
    }

    /// Undo the predictor after decompression
    pub fn decode(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        self.validate()?;
        trace!("Removing predictor {} from {} bytes", self.predictor, data.len());
        match self.predictor {
            1 => Ok(data.to_vec()),
            2 => self.tiff(data, false),
            _ => self.png_decode(data),
        }
    }

    fn png_encode(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let (bpp, row_len) = self.row_layout()?;
        let tag = self.png_tag();

        let mut output = Vec::new();
        output.try_reserve(data.len() + data.len() / row_len.max(1) + 1)?;
        let mut prev_row = zeroed_row(row_len.min(data.len()))?;

        for row in data.chunks(row_len.max(1)) {
            output.push(tag as u8);
            for (i, &byte) in row.iter().enumerate() {
                let left = if i >= bpp { row[i - bpp] } else { 0 };
                let up = prev_row[i];
                let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                let predicted = match tag {
                    PngTag::None => 0,
                    PngTag::Sub => left,
                    PngTag::Up => up,
                    PngTag::Average => average(left, up),
                    PngTag::Paeth => paeth(left, up, up_left),
                };
                output.push(byte.wrapping_sub(predicted));
            }
            prev_row[..row.len()].copy_from_slice(row);
        }
        Ok(output)
    }

    fn png_decode(&self, data: &[u8]) -> PDFToolkitResult<Vec<u8>> {
        let (bpp, row_len) = self.row_layout()?;

        let mut output = Vec::new();
        output.try_reserve(data.len())?;
        let mut prev_row = zeroed_row(row_len.min(data.len()))?;
        let mut current = Vec::new();
        current.try_reserve(prev_row.len())?;

        for chunk in data.chunks(row_len.saturating_add(1)) {
            let tag = PngTag::from_byte(chunk[0])?;
            let row = &chunk[1..];
            current.clear();

            for (i, &byte) in row.iter().enumerate() {
                let left = if i >= bpp { current[i - bpp] } else { 0 };
                let up = prev_row[i];
                let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                let predicted = match tag {
                    PngTag::None => 0,
                    PngTag::Sub => left,
                    PngTag::Up => up,
                    PngTag::Average => average(left, up),
                    PngTag::Paeth => paeth(left, up, up_left),
                };
                current.push(byte.wrapping_add(predicted));
            }

            output.extend_from_slice(&current);
            prev_row[..current.len()].copy_from_slice(&current);
        }
        Ok(output)
    }

    /// TIFF predictor 2; differences are taken per component within a row
    fn tiff(&self, data: &[u8], encode: bool) -> PDFToolkitResult<Vec<u8>> {
        let (_, row_len) = self.row_layout()?;
        let mut output = Vec::new();
        output.try_reserve(data.len())?;
        output.extend_from_slice(data);

        for row in output.chunks_mut(row_len.max(1)) {
            if self.bits_per_component == 16 {
                let stride = self.colors * 2;
                let usable = row.len() - row.len() % 2;
                if encode {
                    // Walk backwards so each left neighbour is still unmodified
                    for i in (stride..usable).step_by(2).rev() {
                        let left = BigEndian::read_u16(&row[i - stride..]);
                        let value = BigEndian::read_u16(&row[i..]);
                        BigEndian::write_u16(&mut row[i..], value.wrapping_sub(left));
                    }
                } else {
                    for i in (stride..usable).step_by(2) {
                        let left = BigEndian::read_u16(&row[i - stride..]);
                        let value = BigEndian::read_u16(&row[i..]);
                        BigEndian::write_u16(&mut row[i..], value.wrapping_add(left));
                    }
                }
            } else {
                let stride = self.colors;
                if encode {
                    for i in (stride..row.len()).rev() {
                        row[i] = row[i].wrapping_sub(row[i - stride]);
                    }
                } else {
                    for i in stride..row.len() {
                        row[i] = row[i].wrapping_add(row[i - stride]);
                    }
                }
            }
        }
        Ok(output)
    }
}

/// Previous-row buffer; never larger than the payload it walks
fn zeroed_row(len: usize) -> PDFToolkitResult<Vec<u8>> {
    let mut row = Vec::new();
    row.try_reserve(len)?;
    row.resize(len, 0);
    Ok(row)
}

fn average(left: u8, up: u8) -> u8 {
    ((left as u16 + up as u16) / 2) as u8
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}
