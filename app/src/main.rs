//! Headless host for the vision bridge.
//!
//! Loads the engine, starts the camera, runs a handful of frames through the
//! contour pipeline and shuts the client down again.

mod config;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cvbridge_engine::{create_client, ClientServices};
use cvbridge_ipc::{command_channel, event_channel, ClientCommand, ClientEvent, FrameSource};

use crate::config::HostConfig;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(50);

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cvbridge=debug,cvbridge_engine=debug,cvbridge_runtime=info,cvbridge_capture=info,cvbridge_transport=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait until `select` accepts an event, logging everything else.
fn wait_for<T>(
    events: &Receiver<ClientEvent>,
    mut select: impl FnMut(&ClientEvent) -> Option<anyhow::Result<T>>,
) -> anyhow::Result<T> {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        let event = events
            .recv_deadline(deadline)
            .map_err(|e| anyhow!("waiting for client event: {e}"))?;
        if let Some(result) = select(&event) {
            return result;
        }
        debug!(?event, "Event");
    }
}

struct Host {
    commands: Sender<ClientCommand>,
    events: Receiver<ClientEvent>,
    config: HostConfig,
    next_request: u64,
}

impl Host {
    fn send(&self, command: ClientCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .map_err(|e| anyhow!("Failed to send command: {e}"))
    }

    fn request_id(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    fn load_engine(&self) -> anyhow::Result<()> {
        self.send(ClientCommand::LoadEngine {
            config: self.config.engine.clone(),
        })?;
        wait_for(&self.events, |event| match event {
            ClientEvent::ReadinessChanged(update) if update.readiness.is_ready() => {
                info!(generation = update.generation, "Engine ready");
                Some(Ok(()))
            }
            ClientEvent::LoadFailed { message, .. } => Some(Err(anyhow!("{message}"))),
            _ => None,
        })
    }

    fn start_camera(&mut self) -> anyhow::Result<()> {
        let request_id = self.request_id();
        self.send(ClientCommand::StartCamera {
            request_id,
            preset: self.config.preset,
            sink_id: self.config.sink_id.clone(),
        })?;
        wait_for(&self.events, |event| match event {
            ClientEvent::CameraStarted {
                request_id: id,
                width,
                height,
            } if *id == request_id => {
                info!(width, height, "Camera started");
                Some(Ok(()))
            }
            ClientEvent::Failed {
                request_id: id,
                message,
            } if *id == request_id => Some(Err(anyhow!("{message}"))),
            _ => None,
        })
    }

    /// Process one camera frame; `None` when no frame was available yet.
    fn process_frame(&mut self) -> anyhow::Result<Option<(usize, usize)>> {
        let request_id = self.request_id();
        self.send(ClientCommand::ProcessFrame {
            request_id,
            source: FrameSource::Camera,
            output_canvas_id: self.config.output_canvas_id.clone(),
        })?;
        wait_for(&self.events, |event| match event {
            ClientEvent::FrameProcessed {
                request_id: id,
                contours,
                external,
            } if *id == request_id => Some(Ok(Some((*contours, *external)))),
            ClientEvent::Failed {
                request_id: id,
                message,
            } if *id == request_id => {
                warn!(%message, "Frame not processed");
                Some(Ok(None))
            }
            _ => None,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        self.load_engine().context("loading engine")?;
        self.start_camera().context("starting camera")?;

        let mut processed = 0;
        let mut attempts = 0;
        while processed < self.config.frames {
            attempts += 1;
            if attempts > self.config.frames * 20 {
                bail!("camera produced {processed} of {} frames", self.config.frames);
            }
            match self.process_frame()? {
                Some((contours, external)) => {
                    processed += 1;
                    info!(frame = processed, contours, external, "Frame processed");
                }
                None => thread::sleep(FRAME_RETRY_DELAY),
            }
        }

        self.send(ClientCommand::StopCamera)?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    info!("cvbridge starting");

    let config = HostConfig::load()?;
    let base_dir = config.base_dir()?;
    debug!(base_dir = %base_dir.display(), script_url = %config.engine.script_url, "Configuration");

    let services = ClientServices::software(&base_dir).context("creating client services")?;

    let (command_tx, command_rx) = command_channel();
    let (event_tx, event_rx) = event_channel();

    let client_thread = thread::Builder::new()
        .name("client".into())
        .spawn(move || {
            info!("Client thread starting");
            let mut client = create_client(command_rx, event_tx, services);
            client.run();
            info!("Client thread stopped");
        })
        .context("spawning client thread")?;

    let mut host = Host {
        commands: command_tx,
        events: event_rx,
        config,
        next_request: 0,
    };
    let outcome = host.run();

    // Shut down regardless of how the session went.
    let _ = host.send(ClientCommand::Shutdown);
    if client_thread.join().is_err() {
        warn!("Client thread panicked");
    }

    outcome
}
