//! The 8 canonical EXIF orientation values and their geometric transforms.
//!
//! Cameras store the sensor image as captured and record how it must be
//! rotated/flipped for upright display. `apply` bakes that transform into a
//! pixel buffer so downstream code never sees a sideways image.

use image::imageops;
use image::RgbaImage;

/// One of the 8 canonical EXIF orientation codes (tag 0x0112, values 1-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// 1: stored upright.
    Normal,
    /// 2: mirrored along the vertical axis.
    FlipHorizontal,
    /// 3: rotated 180 degrees.
    Rotate180,
    /// 4: mirrored along the horizontal axis.
    FlipVertical,
    /// 5: mirrored along the top-left/bottom-right diagonal.
    Transpose,
    /// 6: rotated 90 degrees clockwise.
    Rotate90,
    /// 7: mirrored along the top-right/bottom-left diagonal.
    Transverse,
    /// 8: rotated 90 degrees counter-clockwise.
    Rotate270,
}

impl Orientation {
    /// Maps an EXIF orientation code to its transform. Codes outside 1..=8
    /// are invalid per the EXIF spec.
    pub fn from_exif(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::FlipHorizontal),
            3 => Some(Self::Rotate180),
            4 => Some(Self::FlipVertical),
            5 => Some(Self::Transpose),
            6 => Some(Self::Rotate90),
            7 => Some(Self::Transverse),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }

    pub fn to_exif(self) -> u16 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// True when displaying upright swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Dimensions of the upright image given the stored dimensions.
    pub fn oriented_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Applies the transform, producing the upright pixel buffer.
    pub fn apply(self, image: &RgbaImage) -> RgbaImage {
        match self {
            Self::Normal => image.clone(),
            Self::FlipHorizontal => imageops::flip_horizontal(image),
            Self::Rotate180 => imageops::rotate180(image),
            Self::FlipVertical => imageops::flip_vertical(image),
            Self::Transpose => imageops::flip_horizontal(&imageops::rotate90(image)),
            Self::Rotate90 => imageops::rotate90(image),
            Self::Transverse => imageops::flip_horizontal(&imageops::rotate270(image)),
            Self::Rotate270 => imageops::rotate270(image),
        }
    }
}
