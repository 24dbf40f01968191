//! Background decode worker.
//!
//! - One dedicated thread per in-flight load
//! - Cooperative cancellation: a sticky flag makes the byte source report
//!   EOF on every subsequent read, so the decoder fails fast instead of the
//!   thread being torn down forcefully
//! - The finished result travels back over a one-shot flume channel; the
//!   owner must join the thread before dropping shared state

use std::io::{self, BufRead, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::{ImageFormat, ImageReader, RgbaImage};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::jpeg::JpegContent;

/// Why a load attempt failed. Either kind leaves the document in the
/// Failed state with no pixel buffer exposed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read image file")]
    Io(#[from] io::Error),
    #[error("could not recognize the image format")]
    UnknownFormat,
    #[error("failed to decode image")]
    Decode(#[from] image::ImageError),
    #[error("decode worker terminated without a result")]
    WorkerLost,
}

/// Sticky cancellation flag shared between a worker and its owner.
/// Once set it stays set for the lifetime of that worker.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Byte source that simulates a truncated file once cancellation is
/// requested: every read path reports EOF, so format detection or decoding
/// fails quickly and deterministically.
pub(crate) struct CancellableReader<R> {
    inner: R,
    flag: CancelFlag,
}

impl<R> CancellableReader<R> {
    pub(crate) fn new(inner: R, flag: CancelFlag) -> Self {
        Self { inner, flag }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.flag.is_cancelled() {
            trace!("cancel observed, reporting EOF");
            return Ok(0);
        }
        self.inner.read(buf)
    }
}

impl<R: BufRead> BufRead for CancellableReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.flag.is_cancelled() {
            trace!("cancel observed, reporting EOF");
            return Ok(&[]);
        }
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}

impl<R: Seek> Seek for CancellableReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Everything a successful load hands over to the document: the raw bytes,
/// the fully decoded and orientation-corrected pixel buffer, and the parsed
/// JPEG metadata when available.
pub(crate) struct LoadResult {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
    pub image: RgbaImage,
    pub jpeg: Option<JpegContent>,
}

/// Owner-side handle to a running decode worker.
pub(crate) struct LoaderHandle {
    flag: CancelFlag,
    result_rx: flume::Receiver<Result<LoadResult, LoadError>>,
    thread: Option<JoinHandle<()>>,
}

impl LoaderHandle {
    pub(crate) fn spawn(path: PathBuf) -> Self {
        Self::spawn_with_flag(path, CancelFlag::new())
    }

    pub(crate) fn spawn_with_flag(path: PathBuf, flag: CancelFlag) -> Self {
        let (result_tx, result_rx) = flume::bounded(1);
        let worker_flag = flag.clone();
        let thread = thread::Builder::new()
            .name("glance-loader".to_string())
            .spawn(move || {
                debug!(?path, "decode worker started");
                let result = load(&path, &worker_flag);
                // The owner may already be gone during teardown
                let _ = result_tx.send(result);
                debug!(?path, "decode worker finished");
            })
            .expect("Failed to spawn decode worker");

        Self {
            flag,
            result_rx,
            thread: Some(thread),
        }
    }

    /// Requests cooperative cancellation. Level-triggered; call `join`
    /// afterwards before reusing or dropping shared state.
    pub(crate) fn cancel(&self) {
        self.flag.cancel();
    }

    /// Non-blocking check for the worker's one-shot result.
    pub(crate) fn try_result(&self) -> Option<Result<LoadResult, LoadError>> {
        match self.result_rx.try_recv() {
            Ok(result) => Some(result),
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => Some(Err(LoadError::WorkerLost)),
        }
    }

    /// Blocks until the worker's result is available.
    pub(crate) fn recv_result(&self) -> Result<LoadResult, LoadError> {
        self.result_rx.recv().unwrap_or(Err(LoadError::WorkerLost))
    }

    /// Waits for the worker thread to exit. Idempotent.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.cancel();
        self.join();
    }
}

/// Human-readable tag for a detected format ("jpeg", "png", ...).
pub(crate) fn format_tag(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

/// The worker body: read all bytes, detect the format, decode, and for JPEG
/// parse the EXIF orientation and bake the upright transform into the pixel
/// buffer. All reads after the initial file slurp flow through the
/// cancellable source.
fn load(path: &Path, flag: &CancelFlag) -> Result<LoadResult, LoadError> {
    let bytes = std::fs::read(path)?;
    trace!(?path, len = bytes.len(), "read file content");

    let source = CancellableReader::new(Cursor::new(&bytes[..]), flag.clone());
    let mut reader = ImageReader::new(source).with_guessed_format()?;
    if reader.format().is_none() {
        // Content sniffing found nothing; fall back to the file extension
        if let Ok(format) = ImageFormat::from_path(path) {
            reader.set_format(format);
        }
    }
    let format = reader.format().ok_or(LoadError::UnknownFormat)?;

    let image = reader.decode()?;
    let mut image = image.to_rgba8();

    let mut jpeg = None;
    if format == ImageFormat::Jpeg {
        match JpegContent::parse(&bytes) {
            Ok(content) => {
                let orientation = content.orientation();
                trace!(?path, code = orientation.to_exif(), "applying EXIF orientation");
                image = orientation.apply(&image);
                jpeg = Some(content);
            }
            Err(err) => {
                // Non-fatal: the document just loses orientation edit support
                warn!(?path, error = %err, "EXIF metadata unavailable");
            }
        }
    }

    Ok(LoadResult {
        format,
        bytes,
        image,
        jpeg,
    })
}
