//! Off-thread bitmap decoding.
//!
//! Decoders run on a small fixed pool of worker threads and only produce
//! pixels. Results travel back over a channel and are turned into textures
//! by `Display::poll_loads` on the render thread.

use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use async_channel::{Receiver, Sender};

use crate::error::{DisplayError, Result};
use crate::render::cache::bitmaps::{Bitmap, BitmapId, LoadState};
use crate::render::device::GpuDevice;
use crate::render::frame::Rgba;
use crate::render::Display;

/// Upper bound on decode workers, whatever the core count.
pub const MAX_DECODE_WORKERS: usize = 4;

/// RGBA8 pixels, rows top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadEvent {
    Loaded(BitmapId),
    /// The placeholder stays in place.
    Failed(BitmapId, String),
}

type Completion = (BitmapId, std::result::Result<DecodedImage, String>);
type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Loader {
    jobs: Sender<Job>,
    queue: Receiver<Job>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    workers: usize,
    max_workers: usize,
    in_flight: usize,
}

impl Loader {
    pub(crate) fn new() -> Self {
        let max_workers = thread::available_parallelism()
            .map(NonZero::get)
            .unwrap_or(2)
            .clamp(1, MAX_DECODE_WORKERS);
        Self::with_workers(max_workers)
    }

    pub(crate) fn with_workers(max_workers: usize) -> Self {
        let (jobs, queue) = async_channel::unbounded();
        let (tx, rx) = async_channel::unbounded();
        Self { jobs, queue, tx, rx, workers: 0, max_workers: max_workers.max(1), in_flight: 0 }
    }

    /// Workers are started on demand and live until the loader is dropped,
    /// which closes the job channel.
    fn ensure_worker(&mut self) -> Result<()> {
        if self.workers >= self.max_workers || self.workers > self.in_flight {
            return Ok(());
        }
        let queue = self.queue.clone();
        let spawned = thread::Builder::new()
            .name(format!("display-decode-{}", self.workers))
            .spawn(move || {
                while let Ok(job) = queue.recv_blocking() {
                    job();
                }
            });
        match spawned {
            Ok(_) => {
                self.workers += 1;
                log::debug!("decode worker {} of {} started", self.workers, self.max_workers);
                Ok(())
            }
            // Queued jobs still drain through the workers already running.
            Err(err) if self.workers > 0 => {
                log::warn!("extra decode worker not started: {}", err);
                Ok(())
            }
            Err(err) => Err(DisplayError::Device(format!("decode thread: {err}"))),
        }
    }

    fn spawn<F>(&mut self, id: BitmapId, decode: F) -> Result<()>
    where
        F: FnOnce() -> std::result::Result<DecodedImage, String> + Send + 'static,
    {
        self.ensure_worker()?;
        let tx = self.tx.clone();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(decode))
                .unwrap_or_else(|_| Err("decoder panicked".to_string()));
            // The receiver only goes away with the display itself.
            let _ = tx.send_blocking((id, outcome));
        });
        self.jobs
            .send_blocking(job)
            .map_err(|_| DisplayError::Device("decode queue closed".into()))?;
        self.in_flight += 1;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Completion> {
        let done = self.rx.try_recv().ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(done)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub(crate) fn workers(&self) -> usize {
        self.workers
    }
}

impl<D: GpuDevice> Display<D> {
    /// Returns a bitmap right away, backed by a 1x1 white texture until `decode` completes.
    ///
    /// `width`/`height` are the expected size; the decoded size wins if it differs.
    pub fn load_bitmap_async<F>(&mut self, width: u32, height: u32, decode: F) -> Result<BitmapId>
    where
        F: FnOnce() -> std::result::Result<DecodedImage, String> + Send + 'static,
    {
        let white = Rgba::WHITE;
        let placeholder = self
            .device
            .create_texture(1, 1, Some(&[white.r, white.g, white.b, white.a]), false)?;
        let mut bitmap = Bitmap::new(width, height, self.caps.npot_textures, self.config.smoothing);
        bitmap.texture = Some(placeholder);
        bitmap.load = LoadState::Loading { delete_requested: false };
        let id = self.bitmaps.insert(bitmap);

        if let Err(err) = self.loader.spawn(id, decode) {
            self.bitmaps.remove(id)?;
            self.device.delete_texture(placeholder);
            return Err(err);
        }
        Ok(id)
    }

    /// Decodes queued or running on worker threads.
    pub fn pending_loads(&self) -> usize {
        self.loader.in_flight()
    }

    /// Decode threads started so far. Never above `MAX_DECODE_WORKERS`.
    pub fn decode_workers(&self) -> usize {
        self.loader.workers()
    }

    /// Installs every finished decode. Call on the render thread between frames.
    pub fn poll_loads(&mut self) -> Result<Vec<LoadEvent>> {
        let mut events = Vec::new();
        while let Some((id, outcome)) = self.loader.try_recv() {
            let Ok(bitmap) = self.bitmaps.get_mut(id) else { continue };
            let delete_requested = matches!(bitmap.load, LoadState::Loading { delete_requested: true });
            bitmap.load = LoadState::Ready;

            if delete_requested {
                self.release_bitmap(id)?;
                continue;
            }

            match outcome.and_then(|image| self.install_decoded(id, image).map_err(|e| e.to_string())) {
                Ok(()) => events.push(LoadEvent::Loaded(id)),
                Err(reason) => {
                    log::warn!("bitmap decode failed: {}", reason);
                    events.push(LoadEvent::Failed(id, reason));
                }
            }
        }
        Ok(events)
    }

    fn install_decoded(&mut self, id: BitmapId, image: DecodedImage) -> Result<()> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.pixels.len() != expected {
            return Err(DisplayError::SizeMismatch { expected, actual: image.pixels.len() });
        }
        if self.is_referenced(id) {
            self.flush()?;
        }

        let npot = self.caps.npot_textures;
        let bitmap = self.bitmaps.get_mut(id)?;
        if (bitmap.width, bitmap.height) != (image.width, image.height) {
            bitmap.resize(image.width, image.height, npot);
        }
        let (real_w, real_h, smoothing) = (bitmap.real_width, bitmap.real_height, bitmap.smoothing);

        let texture = self.device.create_texture(real_w, real_h, None, smoothing)?;
        if let Err(err) = self.device.update_texture(texture, image.width, image.height, &image.pixels) {
            self.device.delete_texture(texture);
            return Err(err);
        }

        self.binder.forget(id);
        if self.state.last_bitmap == Some(id) {
            self.state.last_bitmap = None;
        }
        let bitmap = self.bitmaps.get_mut(id)?;
        if let Some(placeholder) = bitmap.texture.replace(texture) {
            self.device.delete_texture(placeholder);
        }
        Ok(())
    }
}
