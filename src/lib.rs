//! Core image pipeline of a desktop viewer: asynchronous document loading
//! and incremental region-based rescaling.
//!
//! The view layer is an external consumer. It asks a [`Document`] to load a
//! resource, gets notified (by polling) when the background decode finishes,
//! and then hands viewport dirty regions to an [`ImageScaler`] to get
//! repaint-ready tiles. Decoding runs on a dedicated worker thread with
//! cooperative cancellation; everything else is single-threaded.

pub mod document;
pub mod geometry;
pub mod orientation;
pub mod scaler;

pub use document::jpeg::JpegContent;
pub use document::loader::LoadError;
pub use document::{Document, DocumentEvent, LoadingState, SaveError};
pub use geometry::{Rect, RectF, Region};
pub use orientation::Orientation;
pub use scaler::{ImageScaler, ScaledTile, TransformationMode};
