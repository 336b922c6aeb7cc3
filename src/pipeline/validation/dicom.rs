//! Minimal DICOM Part 10 reader.
//!
//! Reads only what the upload check and the classifier need: the modality
//! tag, the image pixel module, and native (uncompressed) pixel data.
//! Parsing is tolerant of a missing 128-byte preamble, the way scanners
//! that export "raw" datasets write them.
//!
//! Supported transfer syntaxes:
//! - Implicit VR Little Endian (1.2.840.10008.1.2)
//! - Explicit VR Little Endian (1.2.840.10008.1.2.1)
//! - Encapsulated syntaxes (JPEG, RLE, ...): tags only, pixel data is not decoded

use image::{DynamicImage, GrayImage, RgbImage};
use thiserror::Error;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
/// Nesting bound for undefined-length sequences.
const MAX_SEQUENCE_DEPTH: usize = 16;

const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const DEFLATED_EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1.99";
const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";

/// VRs with a 2-byte reserved field and a 32-bit length in explicit syntax.
const LONG_VRS: &[&[u8; 2]] = &[
    b"OB", b"OD", b"OF", b"OL", b"OV", b"OW", b"SQ", b"SV", b"UC", b"UN", b"UR", b"UT", b"UV",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DicomError {
    #[error("Not a DICOM dataset")]
    NotDicom,

    #[error("DICOM data truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("Malformed DICOM element at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("Unsupported DICOM transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    #[error("Missing DICOM element: {0}")]
    MissingElement(&'static str),

    #[error("Unsupported DICOM pixel data: {0}")]
    UnsupportedPixelData(String),
}

/// A (group, element) data element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag(0x0028, 0x0004);
    pub const PLANAR_CONFIGURATION: Tag = Tag(0x0028, 0x0006);
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    pub const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
    pub const WINDOW_CENTER: Tag = Tag(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag(0x0028, 0x1051);
    pub const RESCALE_INTERCEPT: Tag = Tag(0x0028, 0x1052);
    pub const RESCALE_SLOPE: Tag = Tag(0x0028, 0x1053);
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

    const ITEM: Tag = Tag(0xFFFE, 0xE000);
    const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
    const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferSyntax {
    ImplicitVrLittleEndian,
    ExplicitVrLittleEndian,
    /// Compressed pixel data (explicit VR little endian framing).
    Encapsulated(String),
}

impl TransferSyntax {
    fn from_uid(uid: &str) -> Result<Self, DicomError> {
        match uid {
            IMPLICIT_VR_LE => Ok(Self::ImplicitVrLittleEndian),
            EXPLICIT_VR_LE => Ok(Self::ExplicitVrLittleEndian),
            DEFLATED_EXPLICIT_VR_LE | EXPLICIT_VR_BE => {
                Err(DicomError::UnsupportedTransferSyntax(uid.to_string()))
            }
            other if other.starts_with("1.2.840.10008.1.2.") => {
                Ok(Self::Encapsulated(other.to_string()))
            }
            other => Err(DicomError::UnsupportedTransferSyntax(other.to_string())),
        }
    }

    fn is_explicit(&self) -> bool {
        !matches!(self, Self::ImplicitVrLittleEndian)
    }
}

/// The subset of a DICOM dataset the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomDataset {
    pub has_preamble: bool,
    pub transfer_syntax: TransferSyntax,
    pub modality: Option<String>,
    pub samples_per_pixel: Option<u16>,
    pub photometric_interpretation: Option<String>,
    pub planar_configuration: Option<u16>,
    pub rows: Option<u16>,
    pub columns: Option<u16>,
    pub bits_allocated: Option<u16>,
    pub pixel_representation: Option<u16>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub rescale_intercept: Option<f64>,
    pub rescale_slope: Option<f64>,
    /// Native pixel data bytes. `None` when absent or encapsulated.
    pub pixel_data: Option<Vec<u8>>,
    pub pixel_data_encapsulated: bool,
}

impl DicomDataset {
    fn empty(has_preamble: bool, transfer_syntax: TransferSyntax) -> Self {
        Self {
            has_preamble,
            transfer_syntax,
            modality: None,
            samples_per_pixel: None,
            photometric_interpretation: None,
            planar_configuration: None,
            rows: None,
            columns: None,
            bits_allocated: None,
            pixel_representation: None,
            window_center: None,
            window_width: None,
            rescale_intercept: None,
            rescale_slope: None,
            pixel_data: None,
            pixel_data_encapsulated: false,
        }
    }

    /// Modality code, e.g. "MR" for magnetic resonance.
    pub fn modality(&self) -> Option<&str> {
        self.modality.as_deref()
    }

    pub fn is_magnetic_resonance(&self) -> bool {
        self.modality() == Some("MR")
    }
}

// ═══════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════

/// Quick check for the `DICM` marker after the preamble.
pub fn has_dicom_magic(bytes: &[u8]) -> bool {
    bytes.len() >= PREAMBLE_LEN + MAGIC.len() && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4] == MAGIC
}

/// Parse a DICOM file or preamble-less dataset.
///
/// Stops after the pixel data element; trailing elements are ignored.
pub fn parse(bytes: &[u8]) -> Result<DicomDataset, DicomError> {
    let has_preamble = has_dicom_magic(bytes);
    let start = if has_preamble {
        let start = PREAMBLE_LEN + MAGIC.len();
        check_first_tag(bytes, start)?;
        start
    } else {
        // Without the marker, only accept data that opens with a file meta
        // or identifying group element.
        match peek_group(bytes, 0) {
            Some(0x0002) | Some(0x0008) => 0,
            _ => return Err(DicomError::NotDicom),
        }
    };

    // File meta group (0002) is always explicit VR little endian.
    let mut meta = Reader::new(bytes, start, true);
    let mut transfer_uid: Option<String> = None;
    while peek_group(bytes, meta.pos) == Some(0x0002) {
        let header = meta.read_header()?;
        let value = meta.read_value(&header)?;
        if header.tag == Tag::TRANSFER_SYNTAX_UID {
            transfer_uid = Some(decode_string(value));
        }
    }

    let transfer_syntax = match transfer_uid.as_deref() {
        Some(uid) => TransferSyntax::from_uid(uid)?,
        None if looks_explicit(bytes, meta.pos) => TransferSyntax::ExplicitVrLittleEndian,
        None => TransferSyntax::ImplicitVrLittleEndian,
    };

    let mut dataset = DicomDataset::empty(has_preamble, transfer_syntax.clone());
    let mut reader = Reader::new(bytes, meta.pos, transfer_syntax.is_explicit());

    while !reader.at_end() {
        let header = reader.read_header()?;
        if header.tag.0 == 0xFFFE {
            return Err(DicomError::Malformed {
                offset: reader.pos,
                reason: "item tag outside a sequence".into(),
            });
        }

        if header.len == UNDEFINED_LENGTH {
            if header.tag == Tag::PIXEL_DATA {
                dataset.pixel_data_encapsulated = true;
                break;
            }
            reader.skip_undefined_sequence(0)?;
            continue;
        }

        let value = reader.read_value(&header)?;
        apply_element(&mut dataset, header.tag, value);

        if header.tag == Tag::PIXEL_DATA {
            break;
        }
    }

    Ok(dataset)
}

fn apply_element(dataset: &mut DicomDataset, tag: Tag, value: &[u8]) {
    match tag {
        Tag::MODALITY => dataset.modality = Some(decode_string(value)),
        Tag::SAMPLES_PER_PIXEL => dataset.samples_per_pixel = decode_u16(value),
        Tag::PHOTOMETRIC_INTERPRETATION => {
            dataset.photometric_interpretation = Some(decode_string(value))
        }
        Tag::PLANAR_CONFIGURATION => dataset.planar_configuration = decode_u16(value),
        Tag::ROWS => dataset.rows = decode_u16(value),
        Tag::COLUMNS => dataset.columns = decode_u16(value),
        Tag::BITS_ALLOCATED => dataset.bits_allocated = decode_u16(value),
        Tag::PIXEL_REPRESENTATION => dataset.pixel_representation = decode_u16(value),
        Tag::WINDOW_CENTER => dataset.window_center = decode_decimal(value),
        Tag::WINDOW_WIDTH => dataset.window_width = decode_decimal(value),
        Tag::RESCALE_INTERCEPT => dataset.rescale_intercept = decode_decimal(value),
        Tag::RESCALE_SLOPE => dataset.rescale_slope = decode_decimal(value),
        Tag::PIXEL_DATA => dataset.pixel_data = Some(value.to_vec()),
        _ => {}
    }
}

#[derive(Debug)]
struct ElementHeader {
    tag: Tag,
    len: u32,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    explicit: bool,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], pos: usize, explicit: bool) -> Self {
        Self {
            bytes,
            pos,
            explicit,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DicomError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DicomError::Truncated { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, DicomError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DicomError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_header(&mut self) -> Result<ElementHeader, DicomError> {
        let tag = Tag(self.u16()?, self.u16()?);

        // Item and delimiter tags never carry a VR.
        if tag.0 == 0xFFFE || !self.explicit {
            let len = self.u32()?;
            return Ok(ElementHeader { tag, len });
        }

        let vr_offset = self.pos;
        let vr = self.take(2)?;
        if !vr.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(DicomError::Malformed {
                offset: vr_offset,
                reason: format!("invalid VR bytes {vr:02X?}"),
            });
        }

        let len = if LONG_VRS.iter().any(|long| long.as_slice() == vr) {
            self.take(2)?;
            self.u32()?
        } else {
            u32::from(self.u16()?)
        };
        Ok(ElementHeader { tag, len })
    }

    fn read_value(&mut self, header: &ElementHeader) -> Result<&'a [u8], DicomError> {
        self.take(header.len as usize)
    }

    /// Skip an undefined-length sequence up to and including its delimiter.
    fn skip_undefined_sequence(&mut self, depth: usize) -> Result<(), DicomError> {
        if depth > MAX_SEQUENCE_DEPTH {
            return Err(DicomError::Malformed {
                offset: self.pos,
                reason: "sequence nesting too deep".into(),
            });
        }

        loop {
            let offset = self.pos;
            let header = self.read_header()?;
            match header.tag {
                Tag::SEQUENCE_DELIMITATION => return Ok(()),
                Tag::ITEM if header.len == UNDEFINED_LENGTH => self.skip_undefined_item(depth)?,
                Tag::ITEM => {
                    self.read_value(&header)?;
                }
                other => {
                    return Err(DicomError::Malformed {
                        offset,
                        reason: format!("expected sequence item, found {other:04X?}"),
                    })
                }
            }
        }
    }

    fn skip_undefined_item(&mut self, depth: usize) -> Result<(), DicomError> {
        loop {
            let header = self.read_header()?;
            if header.tag == Tag::ITEM_DELIMITATION {
                return Ok(());
            }
            if header.len == UNDEFINED_LENGTH {
                self.skip_undefined_sequence(depth + 1)?;
            } else {
                self.read_value(&header)?;
            }
        }
    }
}

/// Plausibility of the first element after the `DICM` marker: a full tag
/// header must follow, and (0000,0000) is never a valid opening tag.
fn check_first_tag(bytes: &[u8], start: usize) -> Result<(), DicomError> {
    let header = bytes
        .get(start..start + 8)
        .ok_or(DicomError::Truncated { offset: start })?;
    let group = u16::from_le_bytes([header[0], header[1]]);
    let element = u16::from_le_bytes([header[2], header[3]]);
    if group == 0 && element == 0 {
        return Err(DicomError::Malformed {
            offset: start,
            reason: "invalid first tag (0000,0000)".into(),
        });
    }
    Ok(())
}

fn peek_group(bytes: &[u8], pos: usize) -> Option<u16> {
    let b = bytes.get(pos..pos + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

/// Guess explicit VR when no transfer syntax is declared: two uppercase
/// letters right after the first tag.
fn looks_explicit(bytes: &[u8], pos: usize) -> bool {
    bytes
        .get(pos + 4..pos + 6)
        .map(|vr| vr.iter().all(|b| b.is_ascii_uppercase()))
        .unwrap_or(false)
}

fn decode_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches(['\0', ' '])
        .trim_start()
        .to_string()
}

fn decode_u16(value: &[u8]) -> Option<u16> {
    value.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Decimal string (DS); multi-valued entries use the first value.
fn decode_decimal(value: &[u8]) -> Option<f64> {
    decode_string(value)
        .split('\\')
        .next()
        .and_then(|v| v.trim().parse::<f64>().ok())
}

// ═══════════════════════════════════════════════════════════
// Pixel decoding
// ═══════════════════════════════════════════════════════════

impl DicomDataset {
    /// Decode native pixel data of the first frame into an 8-bit image.
    ///
    /// Monochrome data is rescaled (slope/intercept), windowed (declared
    /// window, else min/max) and mapped to 0..=255; MONOCHROME1 is inverted.
    /// 8-bit RGB is copied as-is.
    pub fn to_image(&self) -> Result<DynamicImage, DicomError> {
        if self.pixel_data_encapsulated {
            let syntax = match &self.transfer_syntax {
                TransferSyntax::Encapsulated(uid) => uid.clone(),
                _ => "encapsulated".to_string(),
            };
            return Err(DicomError::UnsupportedPixelData(format!(
                "compressed pixel data ({syntax})"
            )));
        }

        let data = self
            .pixel_data
            .as_deref()
            .ok_or(DicomError::MissingElement("PixelData"))?;
        let rows = self.rows.ok_or(DicomError::MissingElement("Rows"))? as u32;
        let columns = self.columns.ok_or(DicomError::MissingElement("Columns"))? as u32;
        if rows == 0 || columns == 0 {
            return Err(DicomError::UnsupportedPixelData("zero-sized image".into()));
        }
        let samples = self.samples_per_pixel.unwrap_or(1);
        let bits = self.bits_allocated.unwrap_or(8);
        let pixel_count = rows as usize * columns as usize;

        match (samples, bits) {
            (1, 8) | (1, 16) => {
                let values = self.monochrome_values(data, pixel_count, bits)?;
                let mut gray = window_to_u8(&values, self.window_center, self.window_width);
                if self.photometric_interpretation.as_deref() == Some("MONOCHROME1") {
                    gray.iter_mut().for_each(|v| *v = 255 - *v);
                }
                GrayImage::from_raw(columns, rows, gray)
                    .map(DynamicImage::ImageLuma8)
                    .ok_or(DicomError::Truncated { offset: data.len() })
            }
            (3, 8) => {
                let needed = pixel_count * 3;
                let frame = data
                    .get(..needed)
                    .ok_or(DicomError::Truncated { offset: data.len() })?;
                let interleaved = if self.planar_configuration == Some(1) {
                    let (r, rest) = frame.split_at(pixel_count);
                    let (g, b) = rest.split_at(pixel_count);
                    (0..pixel_count).flat_map(|i| [r[i], g[i], b[i]]).collect()
                } else {
                    frame.to_vec()
                };
                RgbImage::from_raw(columns, rows, interleaved)
                    .map(DynamicImage::ImageRgb8)
                    .ok_or(DicomError::Truncated { offset: data.len() })
            }
            (s, b) => Err(DicomError::UnsupportedPixelData(format!(
                "{s} samples per pixel at {b} bits allocated"
            ))),
        }
    }

    fn monochrome_values(
        &self,
        data: &[u8],
        pixel_count: usize,
        bits: u16,
    ) -> Result<Vec<f64>, DicomError> {
        let signed = self.pixel_representation == Some(1);
        let slope = self.rescale_slope.unwrap_or(1.0);
        let intercept = self.rescale_intercept.unwrap_or(0.0);

        let bytes_per_sample = usize::from(bits / 8);
        let frame = data
            .get(..pixel_count * bytes_per_sample)
            .ok_or(DicomError::Truncated { offset: data.len() })?;

        let raw = frame.chunks_exact(bytes_per_sample).map(|chunk| match (bits, signed) {
            (8, false) => f64::from(chunk[0]),
            (8, true) => f64::from(chunk[0] as i8),
            (_, false) => f64::from(u16::from_le_bytes([chunk[0], chunk[1]])),
            (_, true) => f64::from(i16::from_le_bytes([chunk[0], chunk[1]])),
        });

        Ok(raw.map(|v| v * slope + intercept).collect())
    }
}

fn window_to_u8(values: &[f64], center: Option<f64>, width: Option<f64>) -> Vec<u8> {
    let (low, high) = match (center, width) {
        (Some(c), Some(w)) if w > 0.0 => (c - w / 2.0, c + w / 2.0),
        _ => {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (min, max)
        }
    };

    let span = high - low;
    values
        .iter()
        .map(|v| {
            if span <= 0.0 || !span.is_finite() {
                0
            } else {
                (((v - low) / span).clamp(0.0, 1.0) * 255.0).round() as u8
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Test support: synthetic DICOM writer
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod test_support {
    /// Builds small explicit-VR little-endian DICOM files for tests.
    pub struct DicomBuilder {
        preamble: bool,
        transfer_syntax: Option<&'static str>,
        body: Vec<u8>,
    }

    impl DicomBuilder {
        pub fn new() -> Self {
            Self {
                preamble: true,
                transfer_syntax: Some(super::EXPLICIT_VR_LE),
                body: Vec::new(),
            }
        }

        pub fn without_preamble(mut self) -> Self {
            self.preamble = false;
            self.transfer_syntax = None;
            self
        }

        pub fn transfer_syntax(mut self, uid: &'static str) -> Self {
            self.transfer_syntax = Some(uid);
            self
        }

        pub fn element(mut self, group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Self {
            let mut value = value.to_vec();
            if value.len() % 2 == 1 {
                value.push(if vr == b"UI" || vr == b"OB" { 0 } else { b' ' });
            }
            self.body.extend_from_slice(&group.to_le_bytes());
            self.body.extend_from_slice(&element.to_le_bytes());
            self.body.extend_from_slice(vr);
            if super::LONG_VRS.iter().any(|long| *long == vr) {
                self.body.extend_from_slice(&[0, 0]);
                self.body.extend_from_slice(&(value.len() as u32).to_le_bytes());
            } else {
                self.body.extend_from_slice(&(value.len() as u16).to_le_bytes());
            }
            self.body.extend_from_slice(&value);
            self
        }

        pub fn raw(mut self, bytes: &[u8]) -> Self {
            self.body.extend_from_slice(bytes);
            self
        }

        pub fn modality(self, modality: &str) -> Self {
            self.element(0x0008, 0x0060, b"CS", modality.as_bytes())
        }

        /// Monochrome 8-bit image module plus pixel data.
        pub fn gray8(self, rows: u16, columns: u16, pixels: &[u8]) -> Self {
            self.element(0x0028, 0x0002, b"US", &1u16.to_le_bytes())
                .element(0x0028, 0x0004, b"CS", b"MONOCHROME2")
                .element(0x0028, 0x0010, b"US", &rows.to_le_bytes())
                .element(0x0028, 0x0011, b"US", &columns.to_le_bytes())
                .element(0x0028, 0x0100, b"US", &8u16.to_le_bytes())
                .element(0x0028, 0x0103, b"US", &0u16.to_le_bytes())
                .element(0x7FE0, 0x0010, b"OB", pixels)
        }

        pub fn build(self) -> Vec<u8> {
            let mut out = Vec::new();
            if self.preamble {
                out.extend_from_slice(&[0u8; super::PREAMBLE_LEN]);
                out.extend_from_slice(super::MAGIC);
            }
            if let Some(uid) = self.transfer_syntax {
                let mut value = uid.as_bytes().to_vec();
                if value.len() % 2 == 1 {
                    value.push(0);
                }
                out.extend_from_slice(&0x0002u16.to_le_bytes());
                out.extend_from_slice(&0x0010u16.to_le_bytes());
                out.extend_from_slice(b"UI");
                out.extend_from_slice(&(value.len() as u16).to_le_bytes());
                out.extend_from_slice(&value);
            }
            out.extend_from_slice(&self.body);
            out
        }
    }

    /// A 4×4 MR slice with a gradient.
    pub fn mr_slice() -> Vec<u8> {
        let pixels: Vec<u8> = (0..16).map(|i| (i * 16) as u8).collect();
        DicomBuilder::new().modality("MR").gray8(4, 4, &pixels).build()
    }
}
