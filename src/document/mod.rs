//! Document state machine: the loading lifecycle of a single image resource.
//!
//! A document starts a background decode worker on `init`, and transitions
//! Loading -> {Loaded, Failed} when the worker's one-shot result is consumed
//! via `poll` or `wait_until_done`. Loaded behavior is a tagged union of
//! strategies: the generic strategy supports plain re-encode saves, while the
//! JPEG strategy (selected when EXIF orientation metadata parsed) also
//! supports in-place rotate/flip edits and byte-preserving saves.

pub mod jpeg;
pub mod loader;

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;
use tracing::{debug, warn};

use crate::orientation::Orientation;
use jpeg::JpegContent;
use loader::{format_tag, LoadError, LoadResult, LoaderHandle};

/// Coarse lifecycle state, monotonic within one load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingState {
    NotStarted,
    Loading,
    Loaded,
    Failed,
}

/// Completion notification, delivered exactly once per load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    Loaded { format: &'static str },
    Failed,
}

/// Why a save or edit request was rejected.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The active strategy does not support the operation. Saving before
    /// the document is loaded is a caller logic error and lands here.
    #[error("operation not supported in the current document state")]
    Unsupported,
    #[error("failed to write image file")]
    Io(#[source] std::io::Error),
    #[error("failed to encode image")]
    Encode(#[source] image::ImageError),
}

/// The strategy in effect, swapped as loading completes.
enum DocumentImpl {
    NotStarted,
    Loading(LoaderHandle),
    LoadedGeneric,
    LoadedJpeg(JpegContent),
    Failed,
}

/// A single image resource and its loading lifecycle.
///
/// Not internally thread-safe: a document lives on one thread (typically the
/// UI thread) and only its decode worker runs elsewhere.
pub struct Document {
    path: PathBuf,
    state: DocumentImpl,
    bytes: Vec<u8>,
    image: Option<Arc<RgbaImage>>,
    format: Option<ImageFormat>,
    modified: bool,
}

impl Document {
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            state: DocumentImpl::NotStarted,
            bytes: Vec::new(),
            image: None,
            format: None,
            modified: false,
        }
    }

    /// Starts (or restarts) loading the resource at `path`.
    ///
    /// Any in-flight worker is cancelled and joined first, so at most one
    /// worker exists per document and no stale completion can fire later.
    pub fn init(&mut self, path: impl Into<PathBuf>) {
        self.abort_in_flight();
        self.path = path.into();
        self.bytes.clear();
        self.image = None;
        self.format = None;
        self.modified = false;
        debug!(path = ?self.path, "loading document");
        self.state = DocumentImpl::Loading(LoaderHandle::spawn(self.path.clone()));
    }

    /// Non-blocking completion check. Drives the Loading -> {Loaded, Failed}
    /// transition when the worker has finished; returns the event once.
    pub fn poll(&mut self) -> Option<DocumentEvent> {
        let DocumentImpl::Loading(handle) = &mut self.state else {
            return None;
        };
        let result = handle.try_result()?;
        handle.join();
        Some(self.finish(result))
    }

    /// Blocking variant of `poll`: waits for the worker, then transitions.
    pub fn wait_until_done(&mut self) -> Option<DocumentEvent> {
        let DocumentImpl::Loading(handle) = &mut self.state else {
            return None;
        };
        let result = handle.recv_result();
        handle.join();
        Some(self.finish(result))
    }

    fn finish(&mut self, result: Result<LoadResult, LoadError>) -> DocumentEvent {
        match result {
            Ok(loaded) => {
                let tag = format_tag(loaded.format);
                self.bytes = loaded.bytes;
                self.image = Some(Arc::new(loaded.image));
                self.format = Some(loaded.format);
                self.state = match loaded.jpeg {
                    Some(content) => DocumentImpl::LoadedJpeg(content),
                    None => DocumentImpl::LoadedGeneric,
                };
                debug!(path = ?self.path, format = tag, "document loaded");
                DocumentEvent::Loaded { format: tag }
            }
            Err(err) => {
                warn!(path = ?self.path, error = %err, "document load failed");
                self.state = DocumentImpl::Failed;
                DocumentEvent::Failed
            }
        }
    }

    pub fn loading_state(&self) -> LoadingState {
        match self.state {
            DocumentImpl::NotStarted => LoadingState::NotStarted,
            DocumentImpl::Loading(_) => LoadingState::Loading,
            DocumentImpl::LoadedGeneric | DocumentImpl::LoadedJpeg(_) => LoadingState::Loaded,
            DocumentImpl::Failed => LoadingState::Failed,
        }
    }

    /// True only once a loaded strategy is active. A failed load never
    /// reports as loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.state,
            DocumentImpl::LoadedGeneric | DocumentImpl::LoadedJpeg(_)
        )
    }

    /// The fully decoded, orientation-corrected pixel buffer. `None` until
    /// loaded; partially decoded buffers are never exposed.
    pub fn image(&self) -> Option<Arc<RgbaImage>> {
        self.image.clone()
    }

    /// Raw byte content of the resource, immutable once loaded.
    pub fn raw_data(&self) -> &[u8] {
        &self.bytes
    }

    /// Detected format tag ("jpeg", "png", ...).
    pub fn format(&self) -> Option<&'static str> {
        self.format.map(format_tag)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Orientation metadata, available only on the JPEG strategy.
    pub fn orientation(&self) -> Option<Orientation> {
        match &self.state {
            DocumentImpl::LoadedJpeg(content) => Some(content.orientation()),
            _ => None,
        }
    }

    /// Applies a rotate/flip edit in place. Supported only by the JPEG
    /// strategy; the generic strategy rejects it with `Unsupported`.
    pub fn transform(&mut self, orientation: Orientation) -> Result<(), SaveError> {
        match &mut self.state {
            DocumentImpl::LoadedJpeg(content) => {
                if orientation == Orientation::Normal {
                    return Ok(());
                }
                let image = self.image.as_ref().ok_or(SaveError::Unsupported)?;
                self.image = Some(Arc::new(orientation.apply(image)));
                content.mark_transformed();
                self.modified = true;
                Ok(())
            }
            _ => Err(SaveError::Unsupported),
        }
    }

    /// Writes the document to `dest` in `format`.
    ///
    /// The JPEG strategy preserves metadata: an unmodified document saved as
    /// JPEG is a byte-identical copy of the original, and a modified one
    /// re-encodes the pixel buffer with the original EXIF block carried over
    /// (its orientation tag reset to upright, matching the baked pixels).
    /// Every other loaded save re-encodes the pixel buffer alone. Saving
    /// while not loaded is rejected with `Unsupported`.
    pub fn save(&self, dest: &Path, format: ImageFormat) -> Result<(), SaveError> {
        match &self.state {
            DocumentImpl::LoadedJpeg(content) if format == ImageFormat::Jpeg => {
                if self.modified {
                    self.encode_jpeg_with_metadata(dest, content)
                } else {
                    debug!(?dest, "saving unmodified jpeg byte-for-byte");
                    std::fs::write(dest, &self.bytes).map_err(SaveError::Io)
                }
            }
            DocumentImpl::LoadedJpeg(_) | DocumentImpl::LoadedGeneric => {
                self.encode_to(dest, format)
            }
            DocumentImpl::NotStarted | DocumentImpl::Loading(_) | DocumentImpl::Failed => {
                Err(SaveError::Unsupported)
            }
        }
    }

    fn encode_to(&self, dest: &Path, format: ImageFormat) -> Result<(), SaveError> {
        let image = self.image.as_ref().ok_or(SaveError::Unsupported)?;
        let file = File::create(dest).map_err(SaveError::Io)?;
        let mut writer = BufWriter::new(file);
        debug!(?dest, format = format_tag(format), "encoding document");
        let dynamic = DynamicImage::ImageRgba8((**image).clone());
        let result = match format {
            // JPEG carries no alpha channel
            ImageFormat::Jpeg => dynamic.to_rgb8().write_to(&mut writer, format),
            _ => dynamic.write_to(&mut writer, format),
        };
        result.map_err(encode_error)
    }

    /// Re-encodes the edited pixel buffer and splices the document's EXIF
    /// segment back in right after SOI, so metadata survives an edit.
    fn encode_jpeg_with_metadata(
        &self,
        dest: &Path,
        content: &JpegContent,
    ) -> Result<(), SaveError> {
        let image = self.image.as_ref().ok_or(SaveError::Unsupported)?;
        debug!(?dest, "encoding edited jpeg with metadata carried over");
        let mut encoded = Vec::new();
        DynamicImage::ImageRgba8((**image).clone())
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
            .map_err(encode_error)?;

        let segment = content.exif_segment();
        let mut out = Vec::with_capacity(encoded.len() + segment.len());
        out.extend_from_slice(&encoded[..2]); // SOI
        out.extend_from_slice(segment);
        out.extend_from_slice(&encoded[2..]);
        std::fs::write(dest, out).map_err(SaveError::Io)
    }

    fn abort_in_flight(&mut self) {
        if let DocumentImpl::Loading(handle) = &mut self.state {
            debug!(path = ?self.path, "cancelling in-flight load");
            handle.cancel();
            handle.join();
        }
    }
}

fn encode_error(err: image::ImageError) -> SaveError {
    match err {
        image::ImageError::IoError(io) => SaveError::Io(io),
        other => SaveError::Encode(other),
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        // Never let a completion fire into a destroyed document
        self.abort_in_flight();
    }
}
