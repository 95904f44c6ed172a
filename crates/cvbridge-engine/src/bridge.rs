//! Moving host resources into the engine and back.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use cvbridge_capture::{Canvas, ElementRegistry, FileInput, ImageData, ListenerId, VideoFrame};
use cvbridge_runtime::{ColorConversion, EngineFault, EngineHandle, Mat, MatType};
use cvbridge_transport::{decode_image, BlobStore, ResourceFetcher};
use tracing::{debug, instrument, warn};

use crate::diagnostics::Diagnostics;
use crate::error::BridgeError;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// One-shot completion of an asynchronous bridge operation. Receives
/// exactly one message.
pub type Completion<T> = Receiver<BridgeResult<T>>;

/// Where an image gets drawn.
#[derive(Debug, Clone)]
pub enum CanvasTarget {
    /// Canvas looked up (or created) by id.
    Id(String),

    /// A canvas the caller already holds.
    Surface(Arc<Canvas>),
}

impl From<&str> for CanvasTarget {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<Arc<Canvas>> for CanvasTarget {
    fn from(canvas: Arc<Canvas>) -> Self {
        Self::Surface(canvas)
    }
}

/// Result stream of a file input wired to a canvas: one message per
/// selection.
#[derive(Debug)]
pub struct FileInputBinding {
    pub listener: ListenerId,
    pub loads: Receiver<BridgeResult<()>>,
}

/// Run `work` on a worker thread and deliver its result once.
fn spawn_completion<T, F>(name: &str, work: F) -> Completion<T>
where
    T: Send + 'static,
    F: FnOnce() -> BridgeResult<T> + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker_tx = tx.clone();
    let spawned = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = worker_tx.send(work());
        });
    if let Err(e) = spawned {
        let _ = tx.send(Err(BridgeError::Spawn(e)));
    }
    rx
}

/// Bridges host resources into a ready engine.
///
/// Only constructible from an [`EngineHandle`], so nothing here can run
/// before the engine is ready.
#[derive(Clone)]
pub struct ResourceBridge {
    engine: EngineHandle,
    fetcher: Arc<dyn ResourceFetcher>,
    blobs: Arc<BlobStore>,
    elements: Arc<ElementRegistry>,
    diagnostics: Arc<Diagnostics>,
}

impl ResourceBridge {
    /// `fetcher` must resolve the object URLs handed out by `blobs`.
    pub fn new(
        engine: EngineHandle,
        fetcher: Arc<dyn ResourceFetcher>,
        blobs: Arc<BlobStore>,
        elements: Arc<ElementRegistry>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            engine,
            fetcher,
            blobs,
            elements,
            diagnostics,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    fn fault(&self, fault: EngineFault) -> BridgeError {
        self.diagnostics
            .report(&fault, Some(self.engine.as_ref()))
            .into()
    }

    fn canvas(&self, target: &CanvasTarget) -> Arc<Canvas> {
        match target {
            CanvasTarget::Id(id) => self.elements.canvas(id),
            CanvasTarget::Surface(canvas) => Arc::clone(canvas),
        }
    }

    /// Fetch `url` and store it in the engine filesystem as `/<path>`.
    ///
    /// Nothing is written when the fetch fails.
    #[instrument(name = "fetch_into_engine_fs", skip(self))]
    pub fn fetch_into_engine_filesystem(&self, path: &str, url: &str) -> Completion<()> {
        let bridge = self.clone();
        let path = path.to_string();
        let url = url.to_string();
        spawn_completion("bridge-fetch", move || {
            let data = bridge.fetcher.fetch(&url)?;
            bridge
                .engine
                .fs_create_data_file("/", &path, &data, true, false)
                .map_err(|fault| bridge.fault(fault))?;
            debug!(%path, bytes = data.len(), "Resource stored in engine filesystem");
            Ok(())
        })
    }

    /// Fetch and decode an image, then draw it on the target canvas at
    /// its natural size.
    #[instrument(name = "load_image_into_canvas", skip(self, target))]
    pub fn load_image_into_canvas(&self, url: &str, target: CanvasTarget) -> Completion<()> {
        let bridge = self.clone();
        let url = url.to_string();
        spawn_completion("bridge-image", move || bridge.draw_url(&url, &target))
    }

    fn draw_url(&self, url: &str, target: &CanvasTarget) -> BridgeResult<()> {
        let bytes = self.fetcher.fetch(url)?;
        let image = decode_image(&bytes)?;
        let image = ImageData::new(image.width, image.height, image.rgba)?;
        let canvas = self.canvas(target);
        debug!(canvas = canvas.id(), width = image.width, height = image.height, "Image loaded");
        canvas.draw_image(image);
        Ok(())
    }

    /// Draw the first file of every selection on `input` onto the target.
    ///
    /// Each selection gets a transient object URL, revoked once the draw
    /// finished either way.
    pub fn wire_file_input_to_canvas(
        &self,
        input: &FileInput,
        target: CanvasTarget,
    ) -> FileInputBinding {
        let (tx, rx) = crossbeam_channel::unbounded();
        let bridge = self.clone();

        let listener = input.on_change(move |selection| {
            let Some(file) = selection.first() else {
                return;
            };
            let url = bridge.blobs.create_object_url(file.bytes.clone());
            debug!(file = %file.name, %url, "File selected");

            let worker = bridge.clone();
            let target = target.clone();
            let tx = tx.clone();
            let completion = spawn_completion("bridge-file", move || {
                let result = worker.draw_url(&url, &target);
                worker.blobs.revoke_object_url(&url);
                result
            });
            // Forward without blocking the change event.
            let forwarded = thread::Builder::new()
                .name("bridge-file-forward".into())
                .spawn(move || {
                    let result = completion.recv().unwrap_or(Err(BridgeError::Abandoned));
                    let _ = tx.send(result);
                });
            if let Err(e) = forwarded {
                warn!(error = %e, "Could not forward file load result");
            }
        });

        FileInputBinding {
            listener,
            loads: rx,
        }
    }

    /// Copy a video frame into a new RGBA matrix.
    pub fn frame_to_mat(&self, frame: &VideoFrame) -> BridgeResult<Mat> {
        Mat::from_rgba(&self.engine, frame.width, frame.height, &frame.data)
            .map_err(|fault| self.fault(fault))
    }

    /// Copy the pixels of a canvas into a new RGBA matrix.
    pub fn canvas_to_mat(&self, canvas: &Canvas) -> BridgeResult<Mat> {
        let image = canvas.image_data();
        Mat::from_rgba(&self.engine, image.width, image.height, &image.data)
            .map_err(|fault| self.fault(fault))
    }

    /// Draw an 8-bit matrix of 1, 3 or 4 channels onto a canvas.
    ///
    /// Gray and RGB matrices are expanded to RGBA by the engine.
    pub fn mat_to_canvas(&self, mat: &Mat, canvas: &Canvas) -> BridgeResult<()> {
        let info = mat.info().map_err(|fault| self.fault(fault))?;
        let code = match info.mat_type {
            MatType::Cv8UC1 => Some(ColorConversion::Gray2Rgba),
            MatType::Cv8UC3 => Some(ColorConversion::Rgb2Rgba),
            MatType::Cv8UC4 => None,
            other => return Err(BridgeError::UnsupportedLayout(format!("{other:?}"))),
        };
        let rgba = match code {
            Some(code) => {
                let converted = Mat::empty(&self.engine);
                self.engine
                    .cvt_color(mat.handle(), converted.handle(), code)
                    .map_err(|fault| self.fault(fault))?;
                converted.data()
            }
            None => mat.data(),
        }
        .map_err(|fault| self.fault(fault))?;
        canvas.draw_image(ImageData::new(info.cols, info.rows, rgba)?);
        Ok(())
    }
}
