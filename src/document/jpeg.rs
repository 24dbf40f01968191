//! JPEG metadata support for the metadata-capable loaded strategy.
//!
//! Parsing the embedded EXIF block is best-effort: a JPEG without a readable
//! orientation tag still loads fine, it just ends up on the generic loaded
//! strategy where orientation edits are unavailable. When parsing succeeds
//! the APP1 segment is kept verbatim so edits can save it back into the
//! re-encoded stream.

use std::io::Cursor;

use exif::{In, Tag};
use thiserror::Error;

use crate::orientation::Orientation;

/// Offset of the TIFF structure inside an APP1 segment:
/// marker (2) + length (2) + "Exif\0\0" (6).
const TIFF_OFFSET: usize = 10;

/// Why EXIF orientation could not be extracted. Never fatal for a load.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to parse EXIF container")]
    Exif(#[from] exif::Error),
    #[error("no EXIF segment present")]
    MissingSegment,
    #[error("no orientation tag present")]
    MissingOrientation,
    #[error("orientation value {0} out of range")]
    InvalidOrientation(u32),
}

/// Orientation metadata extracted from a JPEG's EXIF block, plus the raw
/// APP1 segment it came from.
///
/// Held by the JPEG loaded strategy; its presence is what enables rotate/flip
/// edits and metadata-preserving saving on a document.
#[derive(Debug, Clone)]
pub struct JpegContent {
    orientation: Orientation,
    exif_segment: Vec<u8>,
}

impl JpegContent {
    /// Parses the EXIF orientation tag out of raw JPEG bytes and keeps the
    /// APP1 segment carrying it.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        let mut cursor = Cursor::new(bytes);
        let exif = exif::Reader::new().read_from_container(&mut cursor)?;
        let value = exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .ok_or(MetadataError::MissingOrientation)?;
        let orientation = Orientation::from_exif(value as u16)
            .ok_or(MetadataError::InvalidOrientation(value))?;
        let exif_segment =
            find_exif_segment(bytes).ok_or(MetadataError::MissingSegment)?;
        Ok(Self {
            orientation,
            exif_segment,
        })
    }

    /// The orientation the pixel data was stored with.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The complete APP1 EXIF segment (marker, length, payload), suitable
    /// for splicing into a re-encoded JPEG stream right after SOI.
    pub(crate) fn exif_segment(&self) -> &[u8] {
        &self.exif_segment
    }

    /// Records that the pixel buffer has been baked upright (or further
    /// edited), so the stored orientation no longer applies. The segment's
    /// orientation tag is rewritten to 1 to stay consistent with the pixels.
    pub(crate) fn mark_transformed(&mut self) {
        self.orientation = Orientation::Normal;
        reset_orientation_tag(&mut self.exif_segment);
    }
}

/// Walks the JPEG marker segments and returns the first APP1 segment whose
/// payload is an EXIF block, complete with marker and length bytes.
fn find_exif_segment(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // SOS starts entropy-coded data; APP segments only appear before it
        if marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        let end = i + 2 + len;
        if len < 2 || end > bytes.len() {
            return None;
        }
        if marker == 0xE1 && bytes[i + 4..end].starts_with(b"Exif\0\0") {
            return Some(bytes[i..end].to_vec());
        }
        i = end;
    }
    None
}

/// Rewrites the orientation tag of an APP1 EXIF segment to 1 (upright),
/// in place. A malformed segment is left untouched.
fn reset_orientation_tag(segment: &mut [u8]) {
    let Some(tiff) = segment.get_mut(TIFF_OFFSET..) else {
        return;
    };
    let little_endian = match tiff.get(..4) {
        Some(b"II\x2a\x00") => true,
        Some(b"MM\x00\x2a") => false,
        _ => return,
    };
    let read_u16 = |b: [u8; 2]| {
        if little_endian {
            u16::from_le_bytes(b)
        } else {
            u16::from_be_bytes(b)
        }
    };
    let Some(ifd_bytes) = tiff.get(4..8).and_then(|s| <[u8; 4]>::try_from(s).ok()) else {
        return;
    };
    let ifd = if little_endian {
        u32::from_le_bytes(ifd_bytes)
    } else {
        u32::from_be_bytes(ifd_bytes)
    } as usize;
    let Some(count_bytes) = tiff.get(ifd..ifd + 2) else {
        return;
    };
    let count = read_u16([count_bytes[0], count_bytes[1]]) as usize;
    for n in 0..count {
        let offset = ifd + 2 + n * 12;
        let Some(entry) = tiff.get(offset..offset + 12) else {
            return;
        };
        if read_u16([entry[0], entry[1]]) == 0x0112 {
            // SHORT value, left-justified in the 4-byte value field
            let upright = if little_endian {
                1u16.to_le_bytes()
            } else {
                1u16.to_be_bytes()
            };
            tiff[offset + 8] = upright[0];
            tiff[offset + 9] = upright[1];
            return;
        }
    }
}
