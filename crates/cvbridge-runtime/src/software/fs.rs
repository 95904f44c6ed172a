//! In-memory virtual filesystem.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct FileNode {
    data: Vec<u8>,
    can_read: bool,
    #[allow(dead_code)]
    can_write: bool,
}

/// Flat path → file map rooted at `/`.
#[derive(Debug, Default)]
pub(crate) struct VirtualFs {
    files: BTreeMap<String, FileNode>,
}

/// Join and normalize into an absolute path.
pub(crate) fn join(parent: &str, name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in parent.split('/').chain(name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

impl VirtualFs {
    pub fn create_data_file(
        &mut self,
        parent: &str,
        name: &str,
        data: &[u8],
        can_read: bool,
        can_write: bool,
    ) -> Result<String, String> {
        let path = join(parent, name);
        if path == "/" {
            return Err("Invalid file name".to_string());
        }
        if self.files.contains_key(&path) {
            return Err(format!("File exists: {path}"));
        }
        self.files.insert(
            path.clone(),
            FileNode {
                data: data.to_vec(),
                can_read,
                can_write,
            },
        );
        Ok(path)
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, String> {
        let path = join("/", path);
        let node = self
            .files
            .get(&path)
            .ok_or_else(|| format!("No such file or directory: {path}"))?;
        if !node.can_read {
            return Err(format!("Permission denied: {path}"));
        }
        Ok(node.data.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(&join("/", path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}
