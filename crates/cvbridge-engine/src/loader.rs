//! Engine bootstrap and readiness state machine.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use cvbridge_ipc::{EngineReadiness, LoadPhase, ReadinessUpdate};
use cvbridge_runtime::{
    BinaryFetchFn, EngineHandle, EngineOptions, EngineRuntime, ModuleBinding, RuntimeInitializedFn,
};
use cvbridge_transport::ResourceFetcher;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::error::LoadError;

/// Readiness observations. Replays the current state on subscription,
/// then every transition. A failed load delivers the error and closes.
pub type ReadinessStream = Receiver<Result<ReadinessUpdate, LoadError>>;

type Subscriber = Sender<Result<ReadinessUpdate, LoadError>>;

struct HubState {
    generation: u64,
    readiness: EngineReadiness,
    engine: Option<EngineHandle>,
    last_error: Option<LoadError>,
    subscribers: Vec<Subscriber>,
}

impl HubState {
    fn update(&self) -> ReadinessUpdate {
        ReadinessUpdate {
            generation: self.generation,
            readiness: self.readiness,
        }
    }

    fn publish(&mut self) {
        let update = self.update();
        self.subscribers.retain(|s| s.send(Ok(update)).is_ok());
    }
}

/// Single source of truth for the engine load phase.
///
/// Every load attempt gets a new generation; outcomes reported for an
/// older generation are discarded, so each generation sees at most one
/// terminal transition.
pub(crate) struct ReadinessHub {
    state: Mutex<HubState>,
    changed: Condvar,
}

impl ReadinessHub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                generation: 0,
                readiness: EngineReadiness::loading(),
                engine: None,
                last_error: None,
                subscribers: Vec::new(),
            }),
            changed: Condvar::new(),
        }
    }

    pub fn subscribe(&self) -> ReadinessStream {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut state = self.state.lock();
        let _ = tx.send(Ok(state.update()));
        if state.readiness.phase() == LoadPhase::Error {
            if let Some(err) = state.last_error.clone() {
                let _ = tx.send(Err(err));
                return rx;
            }
        }
        state.subscribers.push(tx);
        rx
    }

    pub fn current(&self) -> ReadinessUpdate {
        self.state.lock().update()
    }

    /// Ready engine and the generation that produced it.
    pub fn engine(&self) -> Option<(u64, EngineHandle)> {
        let state = self.state.lock();
        state
            .engine
            .as_ref()
            .map(|engine| (state.generation, Arc::clone(engine)))
    }

    /// Start a new generation in `loading`. `observer`, if any, is
    /// subscribed in the same step, so its first update is that `loading`.
    pub fn begin(&self, observer: Option<Subscriber>) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.readiness = EngineReadiness::loading();
        state.engine = None;
        state.last_error = None;
        state.subscribers.extend(observer);
        state.publish();
        debug!(generation = state.generation, "Readiness: Loading");
        state.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation && state.readiness.is_loading()
    }

    /// Publish `ready` for `generation`, running `on_initialized` first.
    pub fn succeed(
        &self,
        generation: u64,
        engine: EngineHandle,
        on_initialized: Option<RuntimeInitializedFn>,
    ) -> bool {
        if !self.is_current(generation) {
            warn!(generation, "Discarding stale engine initialization");
            return false;
        }

        // The hook runs unlocked so it may query the loader.
        if let Some(hook) = on_initialized {
            hook();
        }

        let mut state = self.state.lock();
        if state.generation != generation || !state.readiness.is_loading() {
            warn!(generation, "Load superseded while running the init hook");
            return false;
        }
        state.readiness = EngineReadiness::ready();
        state.engine = Some(engine);
        state.publish();
        self.changed.notify_all();
        info!(generation, "Readiness: Ready");
        true
    }

    /// Publish `error` for `generation` and close every subscription.
    pub fn fail(&self, generation: u64, err: LoadError) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation || !state.readiness.is_loading() {
            warn!(generation, error = %err, "Discarding stale load failure");
            return false;
        }
        error!(generation, error = %err, "Readiness: Error");
        state.readiness = EngineReadiness::failed();
        state.publish();
        for subscriber in state.subscribers.drain(..) {
            let _ = subscriber.send(Err(err.clone()));
        }
        state.last_error = Some(err);
        self.changed.notify_all();
        true
    }

    pub fn wait_ready(&self, timeout: Duration) -> Result<EngineHandle, LoadError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(engine) = &state.engine {
                return Ok(Arc::clone(engine));
            }
            if let Some(err) = &state.last_error {
                return Err(err.clone());
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return Err(LoadError::TimedOut);
            }
        }
    }
}

/// Loads the engine and owns its readiness.
///
/// Nothing here times out: a script fetch or an engine initialization
/// that never finishes leaves readiness at `loading`.
pub struct EngineLoader {
    runtime: Arc<dyn EngineRuntime>,
    fetcher: Arc<dyn ResourceFetcher>,
    hub: Arc<ReadinessHub>,
}

impl EngineLoader {
    pub fn new(runtime: Arc<dyn EngineRuntime>, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            runtime,
            fetcher,
            hub: Arc::new(ReadinessHub::new()),
        }
    }

    /// Start a load attempt and return its generation.
    ///
    /// `loading` is published before this returns; the terminal state
    /// follows asynchronously. A previous attempt still in flight is
    /// abandoned. Failures are not retried.
    pub fn load(&self, options: EngineOptions) -> u64 {
        self.start(options, None)
    }

    /// [`load`](Self::load), plus a subscription whose first update is this
    /// attempt's `loading`, however quickly the attempt finishes.
    pub fn load_observed(&self, options: EngineOptions) -> (u64, ReadinessStream) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (self.start(options, Some(tx)), rx)
    }

    #[instrument(name = "engine_load", skip_all, fields(script_url = %options.config.script_url))]
    fn start(&self, options: EngineOptions, observer: Option<Subscriber>) -> u64 {
        let generation = self.hub.begin(observer);
        info!(generation, runtime = self.runtime.name(), "Loading engine");

        let runtime = Arc::clone(&self.runtime);
        let fetcher = Arc::clone(&self.fetcher);
        let hub = Arc::clone(&self.hub);

        let spawned = thread::Builder::new()
            .name(format!("engine-load-{generation}"))
            .spawn(move || bootstrap(runtime, fetcher, hub, generation, options));

        if let Err(e) = spawned {
            self.hub.fail(generation, LoadError::Spawn(e.to_string()));
        }
        generation
    }

    pub fn readiness(&self) -> ReadinessStream {
        self.hub.subscribe()
    }

    pub fn current(&self) -> EngineReadiness {
        self.hub.current().readiness
    }

    /// Current generation with its readiness.
    pub fn current_update(&self) -> ReadinessUpdate {
        self.hub.current()
    }

    /// The engine, once ready.
    pub fn engine(&self) -> Option<EngineHandle> {
        self.hub.engine().map(|(_, engine)| engine)
    }

    /// The engine with the generation that loaded it.
    pub fn ready_engine(&self) -> Option<(u64, EngineHandle)> {
        self.hub.engine()
    }

    /// Block until the current load is ready or failed.
    pub fn wait_ready(&self, timeout: Duration) -> Result<EngineHandle, LoadError> {
        self.hub.wait_ready(timeout)
    }
}

fn bootstrap(
    runtime: Arc<dyn EngineRuntime>,
    fetcher: Arc<dyn ResourceFetcher>,
    hub: Arc<ReadinessHub>,
    generation: u64,
    options: EngineOptions,
) {
    let locate_file = options.locator();
    let EngineOptions {
        config,
        on_runtime_initialized,
        ..
    } = options;

    let script = match fetcher.fetch(&config.script_url) {
        Ok(script) => script,
        Err(e) => {
            hub.fail(
                generation,
                LoadError::ScriptFetch {
                    url: config.script_url.clone(),
                    reason: e.to_string(),
                },
            );
            return;
        }
    };
    debug!(bytes = script.len(), "Engine script fetched");

    let binary_fetch: BinaryFetchFn = {
        let fetcher = Arc::clone(&fetcher);
        Arc::new(move |location: &str| {
            fetcher
                .fetch(location)
                .map(|bytes| bytes.to_vec())
                .map_err(|e| e.to_string())
        })
    };
    let module = ModuleBinding::new(
        config.script_url.clone(),
        config.wasm_binary_file.clone(),
        config.using_wasm,
        locate_file,
        binary_fetch,
    );

    let on_ready = {
        let hub = Arc::clone(&hub);
        Box::new(move |engine: EngineHandle| {
            hub.succeed(generation, engine, on_runtime_initialized);
        })
    };

    if let Err(e) = runtime.execute(&script, module, on_ready) {
        hub.fail(generation, LoadError::ScriptExecute(e.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cvbridge_ipc::EngineConfig;
    use cvbridge_runtime::{BootstrapManifest, InitHook, RuntimeResult, SoftwareRuntime};
    use cvbridge_transport::{TransportError, TransportResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    /// Serves a fixed set of URLs, 404 for everything else.
    #[derive(Default)]
    struct MapFetcher {
        files: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn with(mut self, url: &str, body: Vec<u8>) -> Self {
            self.files.insert(url.to_string(), body);
            self
        }
    }

    impl ResourceFetcher for MapFetcher {
        fn fetch(&self, url: &str) -> TransportResult<Bytes> {
            self.requests.lock().push(url.to_string());
            self.files
                .get(url)
                .map(|b| Bytes::from(b.clone()))
                .ok_or_else(|| TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    /// Runtime whose initialization hook is fired by the test.
    #[derive(Clone, Default)]
    struct ManualRuntime {
        hooks: Arc<Mutex<Vec<InitHook>>>,
    }

    impl ManualRuntime {
        fn fire(&self, index: usize) {
            let hook = self.hooks.lock().remove(index);
            let engine: EngineHandle = Arc::new(cvbridge_runtime::SoftwareEngine::new());
            hook(engine);
        }

        fn pending(&self) -> usize {
            self.hooks.lock().len()
        }
    }

    impl EngineRuntime for ManualRuntime {
        fn name(&self) -> &'static str {
            "manual"
        }

        fn execute(&self, _: &[u8], _: ModuleBinding, hook: InitHook) -> RuntimeResult<()> {
            self.hooks.lock().push(hook);
            Ok(())
        }
    }

    const SCRIPT: &str = "assets/opencv.js";

    fn script_fetcher() -> Arc<MapFetcher> {
        Arc::new(MapFetcher::default().with(SCRIPT, BootstrapManifest::new("4.x").to_bytes()))
    }

    fn options() -> EngineOptions {
        EngineOptions::new(EngineConfig::with_script_url(SCRIPT))
    }

    fn collect_until_terminal(stream: &ReadinessStream) -> Vec<Result<ReadinessUpdate, LoadError>> {
        let mut seen = Vec::new();
        while let Ok(item) = stream.recv_timeout(WAIT) {
            let done = match &item {
                Ok(update) => update.readiness.is_ready(),
                Err(_) => true,
            };
            seen.push(item);
            if done {
                break;
            }
        }
        seen
    }

    #[test]
    fn test_initial_state_is_loading() {
        let loader = EngineLoader::new(Arc::new(SoftwareRuntime::new()), script_fetcher());
        assert!(loader.current().is_loading());
        assert!(loader.engine().is_none());

        let stream = loader.readiness();
        let first = stream.try_recv().unwrap().unwrap();
        assert_eq!(first.generation, 0);
        assert!(first.readiness.is_loading());
    }

    #[test]
    fn test_load_reaches_ready() {
        let loader = EngineLoader::new(Arc::new(SoftwareRuntime::new()), script_fetcher());
        let stream = loader.readiness();
        let generation = loader.load(options());

        let engine = loader.wait_ready(WAIT).unwrap();
        assert_eq!(engine.version(), "4.x");

        let seen: Vec<ReadinessUpdate> = collect_until_terminal(&stream)
            .into_iter()
            .map(Result::unwrap)
            .filter(|u| u.generation == generation)
            .collect();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].readiness.is_loading());
        assert!(seen[1].readiness.is_ready());
    }

    #[test]
    fn test_missing_script_errors_and_closes() {
        let loader = EngineLoader::new(
            Arc::new(SoftwareRuntime::new()),
            Arc::new(MapFetcher::default()),
        );
        let stream = loader.readiness();
        loader.load(EngineOptions::new(EngineConfig::with_script_url(
            "assets/missing.js",
        )));

        let seen = collect_until_terminal(&stream);
        let last_update = seen
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .last()
            .copied()
            .unwrap();
        assert_eq!(last_update.readiness, EngineReadiness::failed());
        assert!(matches!(
            seen.last(),
            Some(Err(LoadError::ScriptFetch { .. }))
        ));
        // Closed after the error.
        assert!(stream.recv_timeout(Duration::from_millis(50)).is_err());

        assert!(matches!(
            loader.wait_ready(WAIT),
            Err(LoadError::ScriptFetch { .. })
        ));

        // Late subscribers see the failure too.
        let late = loader.readiness();
        assert!(late.recv().unwrap().unwrap().readiness.is_error());
        assert!(late.recv().unwrap().is_err());
    }

    #[test]
    fn test_unexecutable_script_errors() {
        let fetcher = Arc::new(MapFetcher::default().with(SCRIPT, b"<html>".to_vec()));
        let loader = EngineLoader::new(Arc::new(SoftwareRuntime::new()), fetcher);
        loader.load(options());
        assert!(matches!(
            loader.wait_ready(WAIT),
            Err(LoadError::ScriptExecute(_))
        ));
        assert!(loader.current().is_error());
    }

    #[test]
    fn test_ready_waits_for_runtime_hook() {
        let runtime = ManualRuntime::default();
        let loader = EngineLoader::new(Arc::new(runtime.clone()), script_fetcher());
        loader.load(options());

        // Script executed but the engine has not initialized yet.
        let deadline = Instant::now() + WAIT;
        while runtime.pending() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(loader.current().is_loading());
        assert!(matches!(
            loader.wait_ready(Duration::from_millis(20)),
            Err(LoadError::TimedOut)
        ));

        runtime.fire(0);
        assert!(loader.current().is_ready());
    }

    #[test]
    fn test_init_callback_runs_before_ready() {
        let runtime = ManualRuntime::default();
        let loader = Arc::new(EngineLoader::new(
            Arc::new(runtime.clone()),
            script_fetcher(),
        ));
        let seen_loading = Arc::new(AtomicUsize::new(0));

        let probe = Arc::clone(&loader);
        let flag = Arc::clone(&seen_loading);
        loader.load(options().on_runtime_initialized(move || {
            if probe.current().is_loading() {
                flag.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let deadline = Instant::now() + WAIT;
        while runtime.pending() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        runtime.fire(0);
        assert_eq!(seen_loading.load(Ordering::SeqCst), 1);
        assert!(loader.current().is_ready());
    }

    #[test]
    fn test_reload_is_independent_and_stale_hooks_are_dropped() {
        let runtime = ManualRuntime::default();
        let loader = EngineLoader::new(Arc::new(runtime.clone()), script_fetcher());
        let stream = loader.readiness();

        let first = loader.load(options());
        let deadline = Instant::now() + WAIT;
        while runtime.pending() < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        runtime.fire(0);
        assert!(loader.current().is_ready());

        let second = loader.load(options());
        assert!(second > first);
        assert!(loader.current().is_loading());
        assert!(loader.engine().is_none());

        while runtime.pending() < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        runtime.fire(0);
        assert_eq!(loader.ready_engine().map(|(g, _)| g), Some(second));

        // Each generation: loading first, exactly one terminal state.
        let updates: Vec<ReadinessUpdate> = stream.try_iter().map(Result::unwrap).collect();
        for generation in [first, second] {
            let phases: Vec<LoadPhase> = updates
                .iter()
                .filter(|u| u.generation == generation)
                .map(|u| u.readiness.phase())
                .collect();
            assert_eq!(phases, vec![LoadPhase::Loading, LoadPhase::Ready]);
        }
    }

    #[test]
    fn test_superseded_load_outcome_is_discarded() {
        let hub = ReadinessHub::new();
        let first = hub.begin(None);
        let second = hub.begin(None);
        assert!(!hub.fail(first, LoadError::ScriptExecute("old".into())));
        assert!(hub.current().readiness.is_loading());
        assert!(hub.succeed(second, Arc::new(cvbridge_runtime::SoftwareEngine::new()), None));
        assert!(!hub.succeed(second, Arc::new(cvbridge_runtime::SoftwareEngine::new()), None));
    }

    #[test]
    fn test_binary_payload_is_fetched_through_locator() {
        let fetcher = Arc::new(
            script_fetcher()
                .clone_files()
                .with("assets/wasm/opencv_js.wasm", vec![0, 97, 115, 109]),
        );
        let loader = EngineLoader::new(Arc::new(SoftwareRuntime::new()), fetcher.clone());
        let mut config = EngineConfig::with_script_url(SCRIPT);
        config.using_wasm = true;
        config.wasm_binary_file = Some("opencv_js.wasm".into());

        loader.load(EngineOptions::new(config));
        loader.wait_ready(WAIT).unwrap();
        assert!(fetcher
            .requests
            .lock()
            .contains(&"assets/wasm/opencv_js.wasm".to_string()));
    }

    #[test]
    fn test_unanswered_script_request_stays_loading() {
        // Accepted by the kernel backlog and never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/opencv.js", listener.local_addr().unwrap());
        let fetcher = Arc::new(cvbridge_transport::HttpFetcher::new().unwrap());
        let loader = EngineLoader::new(Arc::new(SoftwareRuntime::new()), fetcher);
        let stream = loader.readiness();

        let generation = loader.load(EngineOptions::new(EngineConfig::with_script_url(url)));
        assert!(matches!(
            loader.wait_ready(Duration::from_millis(500)),
            Err(LoadError::TimedOut)
        ));
        assert!(loader.current().is_loading());
        assert_eq!(loader.current_update().generation, generation);

        let updates: Vec<ReadinessUpdate> = stream.try_iter().map(Result::unwrap).collect();
        assert!(updates.iter().all(|u| u.readiness.is_loading()));
        drop(listener);
    }

    #[test]
    fn test_observed_reload_after_failure_starts_with_loading() {
        let loader = EngineLoader::new(
            Arc::new(SoftwareRuntime::new()),
            Arc::new(MapFetcher::default()),
        );
        let missing = || EngineOptions::new(EngineConfig::with_script_url("assets/missing.js"));
        loader.load(missing());
        assert!(loader.wait_ready(WAIT).is_err());

        // The hub is in `error`; the retry fails again immediately.
        let (generation, stream) = loader.load_observed(missing());
        let seen = collect_until_terminal(&stream);
        let first = seen[0].as_ref().unwrap();
        assert_eq!(first.generation, generation);
        assert!(first.readiness.is_loading());
        assert!(matches!(seen.last(), Some(Err(LoadError::ScriptFetch { .. }))));
    }

    #[test]
    fn test_every_subscriber_sees_each_transition() {
        let loader = EngineLoader::new(Arc::new(SoftwareRuntime::new()), script_fetcher());
        let streams: Vec<ReadinessStream> = (0..3).map(|_| loader.readiness()).collect();
        let generation = loader.load(options());
        loader.wait_ready(WAIT).unwrap();

        for stream in &streams {
            let phases: Vec<LoadPhase> = collect_until_terminal(stream)
                .into_iter()
                .map(Result::unwrap)
                .filter(|u| u.generation == generation)
                .map(|u| u.readiness.phase())
                .collect();
            assert_eq!(phases, vec![LoadPhase::Loading, LoadPhase::Ready]);
        }
    }

    #[test]
    fn test_every_subscriber_gets_the_error_then_closes() {
        let loader = EngineLoader::new(
            Arc::new(SoftwareRuntime::new()),
            Arc::new(MapFetcher::default()),
        );
        let streams: Vec<ReadinessStream> = (0..3).map(|_| loader.readiness()).collect();
        let generation = loader.load(EngineOptions::new(EngineConfig::with_script_url(
            "assets/missing.js",
        )));
        assert!(loader.wait_ready(WAIT).is_err());

        for stream in &streams {
            let seen = collect_until_terminal(stream);
            let phases: Vec<LoadPhase> = seen
                .iter()
                .filter_map(|r| r.as_ref().ok())
                .filter(|u| u.generation == generation)
                .map(|u| u.readiness.phase())
                .collect();
            assert_eq!(phases, vec![LoadPhase::Loading, LoadPhase::Error]);
            assert!(matches!(
                seen.last(),
                Some(Err(LoadError::ScriptFetch { .. }))
            ));
            assert!(stream.recv_timeout(Duration::from_millis(50)).is_err());
        }
    }

    impl MapFetcher {
        fn clone_files(&self) -> Self {
            Self {
                files: self.files.clone(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }
}
