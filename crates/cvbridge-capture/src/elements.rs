//! Named host elements: canvases, video sinks and file inputs.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::canvas::Canvas;
use crate::sink::VideoSink;
use crate::ListenerId;

/// A file picked through a file input.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Bytes,
}

/// Files of one change event.
#[derive(Debug, Clone, Default)]
pub struct FileSelection {
    pub files: Vec<SelectedFile>,
}

impl FileSelection {
    pub fn first(&self) -> Option<&SelectedFile> {
        self.files.first()
    }
}

type ChangeFn = Arc<dyn Fn(&FileSelection) + Send + Sync>;

/// File picker element.
pub struct FileInput {
    id: String,
    listeners: Mutex<Vec<(ListenerId, ChangeFn)>>,
}

impl FileInput {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn on_change(&self, listener: impl Fn(&FileSelection) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Simulate the user picking files, firing change listeners.
    pub fn select(&self, files: Vec<SelectedFile>) {
        let selection = FileSelection { files };
        let listeners: Vec<ChangeFn> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        debug!(input = %self.id, files = selection.files.len(), "File input changed");
        for listener in listeners {
            listener(&selection);
        }
    }
}

impl std::fmt::Debug for FileInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInput")
            .field("id", &self.id)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

/// Registry of elements by id, standing in for the document.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    canvases: RwLock<HashMap<String, Arc<Canvas>>>,
    sinks: RwLock<HashMap<String, Arc<VideoSink>>>,
    inputs: RwLock<HashMap<String, Arc<FileInput>>>,
}

fn get_or_insert<T>(
    map: &RwLock<HashMap<String, Arc<T>>>,
    id: &str,
    make: impl FnOnce() -> T,
) -> Arc<T> {
    if let Some(found) = map.read().get(id) {
        return Arc::clone(found);
    }
    Arc::clone(
        map.write()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(make())),
    )
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canvas with this id, created if missing.
    pub fn canvas(&self, id: &str) -> Arc<Canvas> {
        get_or_insert(&self.canvases, id, || Canvas::new(id))
    }

    pub fn find_canvas(&self, id: &str) -> Option<Arc<Canvas>> {
        self.canvases.read().get(id).cloned()
    }

    /// Video sink with this id, created if missing.
    pub fn sink(&self, id: &str) -> Arc<VideoSink> {
        get_or_insert(&self.sinks, id, || VideoSink::new(id))
    }

    pub fn find_sink(&self, id: &str) -> Option<Arc<VideoSink>> {
        self.sinks.read().get(id).cloned()
    }

    /// File input with this id, created if missing.
    pub fn file_input(&self, id: &str) -> Arc<FileInput> {
        get_or_insert(&self.inputs, id, || FileInput::new(id))
    }
}
