//! Client event loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use cvbridge_capture::{
    CaptureError, CaptureSessionManager, ElementRegistry, MediaDevices, MediaStream,
    StartedCallback, SyntheticCamera, VideoSink,
};
use cvbridge_ipc::{ClientCommand, ClientEvent, EngineConfig, FrameSource, ResolutionPreset};
use cvbridge_runtime::{create_runtime, EngineOptions, EngineRuntime};
use cvbridge_transport::{
    BlobStore, FileFetcher, HttpFetcher, ResourceFetcher, ResourceRouter, TransportResult,
};
use tracing::{debug, info, instrument, warn};

use crate::bridge::{CanvasTarget, Completion, ResourceBridge};
use crate::diagnostics::Diagnostics;
use crate::error::{BridgeError, ClientError};
use crate::loader::{EngineLoader, ReadinessStream};
use crate::pipeline::{ContourPipeline, ContourSummary};

/// How often the loop checks readiness and in-flight requests while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Collaborators the client is wired to.
#[derive(Clone)]
pub struct ClientServices {
    pub runtime: Arc<dyn EngineRuntime>,

    /// Must resolve the object URLs of `blobs`.
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub blobs: Arc<BlobStore>,
    pub devices: Arc<dyn MediaDevices>,
    pub elements: Arc<ElementRegistry>,
}

impl ClientServices {
    /// Bundled software engine and synthetic camera, with resources read
    /// from `base_dir` or over HTTP.
    pub fn software(base_dir: impl Into<PathBuf>) -> TransportResult<Self> {
        let blobs = Arc::new(BlobStore::new());
        let router = ResourceRouter::new(Arc::clone(&blobs), FileFetcher::new(base_dir))
            .with_remote(Arc::new(HttpFetcher::new()?));
        Ok(Self {
            runtime: create_runtime(),
            fetcher: Arc::new(router),
            blobs,
            devices: Arc::new(SyntheticCamera::new()),
            elements: Arc::new(ElementRegistry::new()),
        })
    }
}

/// Engine-bound components of one load generation.
struct Components {
    generation: u64,
    bridge: ResourceBridge,
    pipeline: ContourPipeline,
}

struct PendingRequest {
    request_id: u64,
    completion: Completion<()>,
}

/// Processes [`ClientCommand`]s in order on one thread and reports
/// results as [`ClientEvent`]s.
pub struct Client {
    command_rx: Receiver<ClientCommand>,
    event_tx: Sender<ClientEvent>,
    services: ClientServices,
    loader: EngineLoader,
    readiness: ReadinessStream,
    capture: CaptureSessionManager,
    diagnostics: Arc<Diagnostics>,
    components: Option<Components>,
    pending: Vec<PendingRequest>,
}

impl Client {
    pub fn new(
        command_rx: Receiver<ClientCommand>,
        event_tx: Sender<ClientEvent>,
        services: ClientServices,
    ) -> Self {
        let loader = EngineLoader::new(
            Arc::clone(&services.runtime),
            Arc::clone(&services.fetcher),
        );
        let readiness = loader.readiness();
        let capture = CaptureSessionManager::new(
            Arc::clone(&services.devices),
            Arc::clone(&services.elements),
        );
        Self {
            command_rx,
            event_tx,
            services,
            loader,
            readiness,
            capture,
            diagnostics: Arc::new(Diagnostics::new()),
            components: None,
            pending: Vec::new(),
        }
    }

    pub fn loader(&self) -> &EngineLoader {
        &self.loader
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Run the client (blocking).
    #[instrument(name = "client_run", skip(self))]
    pub fn run(&mut self) {
        info!("Client starting");
        self.send_event(ClientEvent::Started);

        loop {
            match self.command_rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    break;
                }
            }
            self.forward_readiness();
            self.poll_pending();
        }

        self.capture.stop();
        info!("Client stopped");
    }

    /// Handle a command. Returns false if the client should stop.
    fn handle_command(&mut self, command: ClientCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            ClientCommand::LoadEngine { config } => self.load_engine(config),
            ClientCommand::LoadImageFromFile {
                request_id,
                path,
                canvas_id,
            } => {
                let url = path.to_string_lossy().into_owned();
                self.submit(request_id, |bridge| {
                    bridge.load_image_into_canvas(&url, CanvasTarget::Id(canvas_id))
                });
            }
            ClientCommand::LoadImageFromUrl {
                request_id,
                url,
                canvas_id,
            } => self.submit(request_id, |bridge| {
                bridge.load_image_into_canvas(&url, CanvasTarget::Id(canvas_id))
            }),
            ClientCommand::FetchResource {
                request_id,
                path,
                url,
            } => self.submit(request_id, |bridge| {
                bridge.fetch_into_engine_filesystem(&path, &url)
            }),
            ClientCommand::StartCamera {
                request_id,
                preset,
                sink_id,
            } => self.start_camera(request_id, preset, &sink_id),
            ClientCommand::StopCamera => self.capture.stop(),
            ClientCommand::ProcessFrame {
                request_id,
                source,
                output_canvas_id,
            } => match self.process_frame(&source, &output_canvas_id) {
                Ok(summary) => self.send_event(ClientEvent::FrameProcessed {
                    request_id,
                    contours: summary.contours,
                    external: summary.external,
                }),
                Err(e) => self.fail(request_id, e),
            },
            ClientCommand::GetReadiness => {
                self.send_event(ClientEvent::ReadinessChanged(self.loader.current_update()))
            }
            ClientCommand::Shutdown => {
                self.capture.stop();
                self.send_event(ClientEvent::Shutdown);
                return false;
            }
        }

        true
    }

    fn load_engine(&mut self, config: EngineConfig) {
        // Deliver what the previous load published, then follow the new
        // one from its `loading`. A failed load closes its subscription.
        self.forward_readiness();
        self.components = None;
        let (_, readiness) = self.loader.load_observed(EngineOptions::new(config));
        self.readiness = readiness;
    }

    /// Components for the ready engine, rebuilt after a reload.
    fn components(&mut self) -> Result<&mut Components, ClientError> {
        let Some((generation, engine)) = self.loader.ready_engine() else {
            self.components = None;
            return Err(ClientError::EngineNotReady);
        };

        if self.components.as_ref().map(|c| c.generation) != Some(generation) {
            debug!(generation, "Binding components to engine");
            let bridge = ResourceBridge::new(
                Arc::clone(&engine),
                Arc::clone(&self.services.fetcher),
                Arc::clone(&self.services.blobs),
                Arc::clone(&self.services.elements),
                Arc::clone(&self.diagnostics),
            );
            self.components = Some(Components {
                generation,
                bridge,
                pipeline: ContourPipeline::new(engine),
            });
        }
        self.components.as_mut().ok_or(ClientError::EngineNotReady)
    }

    fn submit(&mut self, request_id: u64, op: impl FnOnce(&ResourceBridge) -> Completion<()>) {
        match self.components() {
            Ok(components) => {
                let completion = op(&components.bridge);
                self.pending.push(PendingRequest {
                    request_id,
                    completion,
                });
            }
            Err(e) => self.fail(request_id, e),
        }
    }

    fn start_camera(&mut self, request_id: u64, preset: ResolutionPreset, sink_id: &str) {
        let events = self.event_tx.clone();
        let on_started: StartedCallback = Arc::new(move |stream: &MediaStream, _: &VideoSink| {
            let (width, height) = stream.video_track().dimensions();
            let _ = events.try_send(ClientEvent::CameraStarted {
                request_id,
                width,
                height,
            });
        });

        match self.capture.start(preset, on_started, sink_id) {
            Ok(()) => {}
            Err(CaptureError::Media(e)) => {
                let message = self.diagnostics.camera_error(&e);
                self.send_event(ClientEvent::Failed {
                    request_id,
                    message,
                });
            }
            Err(e) => self.fail(request_id, e.into()),
        }
    }

    #[instrument(name = "process_frame", skip(self))]
    fn process_frame(
        &mut self,
        source: &FrameSource,
        output_canvas_id: &str,
    ) -> Result<ContourSummary, ClientError> {
        if self.loader.ready_engine().is_none() {
            return Err(ClientError::EngineNotReady);
        }

        let (frame, input) = match source {
            FrameSource::Camera => {
                let frame = self.capture.current_frame().ok_or(ClientError::NoFrame)?;
                (Some(frame), None)
            }
            FrameSource::Canvas(id) => {
                let canvas = self
                    .services
                    .elements
                    .find_canvas(id)
                    .ok_or_else(|| ClientError::CanvasNotFound(id.clone()))?;
                (None, Some(canvas))
            }
        };
        let output_canvas = self.services.elements.canvas(output_canvas_id);
        let diagnostics = Arc::clone(&self.diagnostics);

        let components = self.components()?;
        let (mat, width, height) = match (frame, input) {
            (Some(frame), _) => {
                let mat = components.bridge.frame_to_mat(&frame)?;
                (mat, frame.width, frame.height)
            }
            (None, Some(canvas)) => {
                let (width, height) = canvas.dimensions();
                if width == 0 || height == 0 {
                    return Err(ClientError::NoFrame);
                }
                (components.bridge.canvas_to_mat(&canvas)?, width, height)
            }
            (None, None) => return Err(ClientError::NoFrame),
        };

        let engine = Arc::clone(components.bridge.engine());
        let output = components
            .pipeline
            .extract_contours(&mat, width, height)
            .map_err(|fault| diagnostics.report(&fault, Some(engine.as_ref())))?;
        components.bridge.mat_to_canvas(output, &output_canvas)?;
        Ok(components.pipeline.last_summary())
    }

    fn forward_readiness(&mut self) {
        loop {
            match self.readiness.try_recv() {
                Ok(Ok(update)) => {
                    debug!(
                        generation = update.generation,
                        phase = update.readiness.phase().name(),
                        "Readiness changed"
                    );
                    self.send_event(ClientEvent::ReadinessChanged(update));
                }
                Ok(Err(e)) => {
                    let message = e.to_string();
                    self.diagnostics.record(&message);
                    self.send_event(ClientEvent::LoadFailed {
                        generation: self.loader.current_update().generation,
                        message,
                    });
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn poll_pending(&mut self) {
        let mut finished = Vec::new();
        self.pending
            .retain(|request| match request.completion.try_recv() {
                Ok(result) => {
                    finished.push((request.request_id, result));
                    false
                }
                Err(TryRecvError::Empty) => true,
                Err(TryRecvError::Disconnected) => {
                    finished.push((request.request_id, Err(BridgeError::Abandoned)));
                    false
                }
            });

        for (request_id, result) in finished {
            match result {
                Ok(()) => self.send_event(ClientEvent::Completed { request_id }),
                Err(e) => self.fail(request_id, e.into()),
            }
        }
    }

    fn fail(&self, request_id: u64, err: ClientError) {
        let message = err.to_string();
        if self.diagnostics.last_error().as_deref() != Some(message.as_str()) {
            self.diagnostics.record(&message);
        }
        self.send_event(ClientEvent::Failed {
            request_id,
            message,
        });
    }

    fn send_event(&self, event: ClientEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.capture.stop();
    }
}
