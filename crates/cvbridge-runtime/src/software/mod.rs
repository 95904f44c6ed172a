//! Bundled pure-Rust engine.

mod contours;
mod draw;
mod fs;
mod imgproc;

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::engine::{
    ColorConversion, ContourApproximation, MatHandle, MatInfo, MatType, Point, Scalar,
    VectorHandle, VisionEngine,
};
use crate::error::EngineFault;
use crate::mat::HierarchyEntry;
use crate::EngineResult;

use self::fs::VirtualFs;

/// Base of the exception handle space, so handles never look like small
/// integers.
const EXCEPTION_BASE: u64 = 0x0010_0000;

#[derive(Debug, Clone)]
struct MatData {
    info: MatInfo,
    data: Vec<u8>,
}

impl MatData {
    fn empty() -> Self {
        Self {
            info: MatInfo {
                rows: 0,
                cols: 0,
                mat_type: MatType::Cv8UC1,
            },
            data: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Storage {
    mats: HashMap<u32, MatData>,
    vectors: HashMap<u32, Vec<Vec<Point>>>,
    next_id: u32,
    exceptions: HashMap<u64, String>,
    next_exception: u64,
    fs: VirtualFs,
}

impl Storage {
    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn mat(&self, handle: MatHandle) -> Result<&MatData, String> {
        self.mats
            .get(&handle.raw())
            .ok_or_else(|| format!("Mat {} has been deleted", handle.raw()))
    }

    fn mat_mut(&mut self, handle: MatHandle) -> Result<&mut MatData, String> {
        self.mats
            .get_mut(&handle.raw())
            .ok_or_else(|| format!("Mat {} has been deleted", handle.raw()))
    }

    fn vector(&self, handle: VectorHandle) -> Result<&Vec<Vec<Point>>, String> {
        self.vectors
            .get(&handle.raw())
            .ok_or_else(|| format!("MatVector {} has been deleted", handle.raw()))
    }

    /// Replace a matrix's shape and contents, as `create` + copy would.
    fn assign(&mut self, handle: MatHandle, info: MatInfo, data: Vec<u8>) -> Result<(), String> {
        let mat = self.mat_mut(handle)?;
        mat.info = info;
        mat.data = data;
        Ok(())
    }

    fn raise(&mut self, message: String) -> EngineFault {
        let ptr = EXCEPTION_BASE + self.next_exception * 16;
        self.next_exception += 1;
        self.exceptions.insert(ptr, message);
        EngineFault::Code(ptr)
    }
}

/// Software implementation of [`VisionEngine`].
///
/// All state lives behind one lock; failures are recorded in an exception
/// table and surfaced as [`EngineFault::Code`] handles.
pub struct SoftwareEngine {
    version: String,
    storage: Mutex<Storage>,
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self::with_version(env!("CARGO_PKG_VERSION"))
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            storage: Mutex::new(Storage::default()),
        }
    }

    /// Number of files in the virtual filesystem.
    pub fn file_count(&self) -> usize {
        self.storage.lock().fs.len()
    }

    fn run<T>(&self, op: impl FnOnce(&mut Storage) -> Result<T, String>) -> EngineResult<T> {
        let mut storage = self.storage.lock();
        match op(&mut *storage) {
            Ok(value) => Ok(value),
            Err(message) => Err(storage.raise(message)),
        }
    }

    fn checked_len(rows: u32, cols: u32, mat_type: MatType) -> Result<usize, String> {
        (rows as usize)
            .checked_mul(cols as usize)
            .and_then(|n| n.checked_mul(mat_type.elem_size()))
            .ok_or_else(|| format!("Mat {rows}x{cols} is too large"))
    }
}

impl Default for SoftwareEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn hierarchy_bytes(entries: &[HierarchyEntry]) -> Vec<u8> {
    entries
        .iter()
        .flat_map(|entry| entry.iter().flat_map(|v| v.to_le_bytes()))
        .collect()
}

fn hierarchy_from_bytes(data: &[u8]) -> Vec<HierarchyEntry> {
    data.chunks_exact(16)
        .map(|chunk| {
            let mut entry = [0i32; 4];
            for (slot, b) in entry.iter_mut().zip(chunk.chunks_exact(4)) {
                *slot = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            }
            entry
        })
        .collect()
}

/// `index` followed by every contour nested under it.
fn with_descendants(hierarchy: &[HierarchyEntry], index: usize) -> Vec<usize> {
    let mut out = vec![index];
    let mut stack = Vec::new();
    if let Some(child) = hierarchy.get(index).map(|e| e[2]).filter(|c| *c >= 0) {
        stack.push(child as usize);
    }
    while let Some(i) = stack.pop() {
        if i >= hierarchy.len() || out.contains(&i) {
            continue;
        }
        out.push(i);
        let [next, _, child, _] = hierarchy[i];
        if next >= 0 {
            stack.push(next as usize);
        }
        if child >= 0 {
            stack.push(child as usize);
        }
    }
    out
}

impl VisionEngine for SoftwareEngine {
    fn name(&self) -> &str {
        "software"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn mat_empty(&self) -> MatHandle {
        let mut storage = self.storage.lock();
        let id = storage.alloc_id();
        storage.mats.insert(id, MatData::empty());
        MatHandle::from_raw(id)
    }

    fn mat_from_data(
        &self,
        rows: u32,
        cols: u32,
        mat_type: MatType,
        data: &[u8],
    ) -> EngineResult<MatHandle> {
        self.run(|storage| {
            let len = Self::checked_len(rows, cols, mat_type)?;
            if data.len() < len {
                return Err(format!(
                    "Buffer of {} bytes is too small for a {rows}x{cols} {mat_type:?} Mat",
                    data.len()
                ));
            }
            let id = storage.alloc_id();
            storage.mats.insert(
                id,
                MatData {
                    info: MatInfo {
                        rows,
                        cols,
                        mat_type,
                    },
                    data: data[..len].to_vec(),
                },
            );
            Ok(MatHandle::from_raw(id))
        })
    }

    fn mat_filled(
        &self,
        rows: u32,
        cols: u32,
        mat_type: MatType,
        value: u8,
    ) -> EngineResult<MatHandle> {
        self.run(|storage| {
            let len = Self::checked_len(rows, cols, mat_type)?;
            let id = storage.alloc_id();
            storage.mats.insert(
                id,
                MatData {
                    info: MatInfo {
                        rows,
                        cols,
                        mat_type,
                    },
                    data: vec![value; len],
                },
            );
            Ok(MatHandle::from_raw(id))
        })
    }

    fn mat_set_to(&self, mat: MatHandle, value: Scalar) -> EngineResult<()> {
        self.run(|storage| {
            let mat = storage.mat_mut(mat)?;
            if mat.info.mat_type == MatType::Cv32SC4 {
                return Err("setTo is not supported for 32-bit matrices".to_string());
            }
            let channels = mat.info.mat_type.channels();
            let bytes = value.to_bytes();
            for px in mat.data.chunks_exact_mut(channels) {
                px.copy_from_slice(&bytes[..channels]);
            }
            Ok(())
        })
    }

    fn mat_info(&self, mat: MatHandle) -> EngineResult<MatInfo> {
        self.run(|storage| Ok(storage.mat(mat)?.info))
    }

    fn mat_data(&self, mat: MatHandle) -> EngineResult<Vec<u8>> {
        self.run(|storage| Ok(storage.mat(mat)?.data.clone()))
    }

    fn mat_delete(&self, mat: MatHandle) {
        if self.storage.lock().mats.remove(&mat.raw()).is_some() {
            trace!(mat = mat.raw(), "Mat deleted");
        }
    }

    fn vector_new(&self) -> VectorHandle {
        let mut storage = self.storage.lock();
        let id = storage.alloc_id();
        storage.vectors.insert(id, Vec::new());
        VectorHandle::from_raw(id)
    }

    fn vector_len(&self, vector: VectorHandle) -> EngineResult<usize> {
        self.run(|storage| Ok(storage.vector(vector)?.len()))
    }

    fn vector_delete(&self, vector: VectorHandle) {
        self.storage.lock().vectors.remove(&vector.raw());
    }

    fn live_buffers(&self) -> usize {
        let storage = self.storage.lock();
        storage.mats.len() + storage.vectors.len()
    }

    fn cvt_color(&self, src: MatHandle, dst: MatHandle, code: ColorConversion) -> EngineResult<()> {
        self.run(|storage| {
            let source = storage.mat(src)?;
            let MatInfo {
                rows,
                cols,
                mat_type,
            } = source.info;
            let (expected, out_type) = match code {
                ColorConversion::Rgba2Gray => (MatType::Cv8UC4, MatType::Cv8UC1),
                ColorConversion::Rgb2Gray => (MatType::Cv8UC3, MatType::Cv8UC1),
                ColorConversion::Gray2Rgba => (MatType::Cv8UC1, MatType::Cv8UC4),
                ColorConversion::Rgb2Rgba => (MatType::Cv8UC3, MatType::Cv8UC4),
            };
            if mat_type != expected {
                return Err(format!(
                    "cvtColor {code:?} expects {expected:?} input, got {mat_type:?}"
                ));
            }
            let data = match code {
                ColorConversion::Rgba2Gray => imgproc::to_gray(&source.data, 4),
                ColorConversion::Rgb2Gray => imgproc::to_gray(&source.data, 3),
                ColorConversion::Gray2Rgba => imgproc::gray_to_rgba(&source.data),
                ColorConversion::Rgb2Rgba => imgproc::rgb_to_rgba(&source.data),
            };
            storage.assign(
                dst,
                MatInfo {
                    rows,
                    cols,
                    mat_type: out_type,
                },
                data,
            )
        })
    }

    fn threshold(
        &self,
        src: MatHandle,
        dst: MatHandle,
        thresh: f64,
        max_value: f64,
    ) -> EngineResult<f64> {
        self.run(|storage| {
            let source = storage.mat(src)?;
            if source.info.mat_type == MatType::Cv32SC4 {
                return Err("threshold expects 8-bit input".to_string());
            }
            let info = source.info;
            let data = imgproc::threshold(&source.data, thresh, max_value);
            storage.assign(dst, info, data)?;
            Ok(thresh.floor())
        })
    }

    fn find_contours(
        &self,
        image: MatHandle,
        contours: VectorHandle,
        hierarchy: MatHandle,
        method: ContourApproximation,
        offset: Point,
    ) -> EngineResult<()> {
        self.run(|storage| {
            let source = storage.mat(image)?;
            if source.info.mat_type != MatType::Cv8UC1 {
                return Err(format!(
                    "findContours expects a single-channel 8-bit image, got {:?}",
                    source.info.mat_type
                ));
            }
            let borders = contours::find_borders(
                &source.data,
                source.info.cols as usize,
                source.info.rows as usize,
            );
            let parents = contours::two_level_parents(&borders);
            let sequences: Vec<Vec<Point>> = borders
                .into_iter()
                .map(|border| {
                    contours::approximate(border.points, method)
                        .into_iter()
                        .map(|p| Point::new(p.x + offset.x, p.y + offset.y))
                        .collect()
                })
                .collect();
            let entries = contours::link_hierarchy(&parents);

            trace!(count = sequences.len(), "Contours found");

            if !storage.vectors.contains_key(&contours.raw()) {
                return Err(format!("MatVector {} has been deleted", contours.raw()));
            }
            storage.assign(
                hierarchy,
                MatInfo {
                    rows: u32::from(!entries.is_empty()),
                    cols: entries.len() as u32,
                    mat_type: MatType::Cv32SC4,
                },
                hierarchy_bytes(&entries),
            )?;
            storage.vectors.insert(contours.raw(), sequences);
            Ok(())
        })
    }

    fn draw_contours(
        &self,
        image: MatHandle,
        contours: VectorHandle,
        index: i32,
        color: Scalar,
        thickness: i32,
        hierarchy: Option<MatHandle>,
    ) -> EngineResult<()> {
        self.run(|storage| {
            if thickness <= 0 {
                return Err(format!("Unsupported contour thickness {thickness}"));
            }
            let sequences = storage.vector(contours)?.clone();
            let links = match hierarchy {
                Some(h) => Some(hierarchy_from_bytes(&storage.mat(h)?.data)),
                None => None,
            };

            let selected: Vec<usize> = if index < 0 {
                (0..sequences.len()).collect()
            } else {
                let index = index as usize;
                if index >= sequences.len() {
                    return Err(format!("Contour index {index} out of range"));
                }
                match &links {
                    Some(links) if links.len() == sequences.len() => {
                        with_descendants(links, index)
                    }
                    _ => vec![index],
                }
            };

            let target = storage.mat_mut(image)?;
            if target.info.mat_type == MatType::Cv32SC4 {
                return Err("drawContours expects an 8-bit image".to_string());
            }
            let mut canvas = draw::Canvas {
                width: target.info.cols as i32,
                height: target.info.rows as i32,
                channels: target.info.mat_type.channels(),
                data: &mut target.data,
            };
            let rgba = color.to_bytes();
            for i in selected {
                canvas.polygon(&sequences[i], &rgba, thickness);
            }
            Ok(())
        })
    }

    fn fs_create_data_file(
        &self,
        parent: &str,
        name: &str,
        data: &[u8],
        can_read: bool,
        can_write: bool,
    ) -> EngineResult<()> {
        self.run(|storage| {
            let path = storage
                .fs
                .create_data_file(parent, name, data, can_read, can_write)?;
            trace!(%path, bytes = data.len(), "File created");
            Ok(())
        })
    }

    fn fs_read_file(&self, path: &str) -> EngineResult<Vec<u8>> {
        self.run(|storage| storage.fs.read(path))
    }

    fn fs_exists(&self, path: &str) -> bool {
        self.storage.lock().fs.exists(path)
    }

    fn exception_from_ptr(&self, ptr: u64) -> Option<String> {
        self.storage.lock().exceptions.get(&ptr).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(width: u32, height: u32, value: u8) -> Vec<u8> {
        vec![value; (width * height * 4) as usize]
    }

    #[test]
    fn test_failures_resolve_through_exception_table() {
        let engine = SoftwareEngine::new();
        let gray = engine.mat_empty();
        let rgb = engine.mat_filled(2, 2, MatType::Cv8UC3, 0).unwrap();

        let fault = engine
            .cvt_color(rgb, gray, ColorConversion::Rgba2Gray)
            .unwrap_err();
        let EngineFault::Code(ptr) = fault else {
            panic!("expected a code fault");
        };
        let message = engine.exception_from_ptr(ptr).unwrap();
        assert!(message.contains("Cv8UC4"), "{message}");
        assert!(engine.exception_from_ptr(ptr + 1).is_none());
    }

    #[test]
    fn test_cvt_color_reallocates_destination() {
        let engine = SoftwareEngine::new();
        let src = engine
            .mat_from_data(3, 5, MatType::Cv8UC4, &rgba(5, 3, 255))
            .unwrap();
        let dst = engine.mat_empty();
        engine
            .cvt_color(src, dst, ColorConversion::Rgba2Gray)
            .unwrap();
        let info = engine.mat_info(dst).unwrap();
        assert_eq!((info.rows, info.cols, info.mat_type), (3, 5, MatType::Cv8UC1));
        assert!(engine.mat_data(dst).unwrap().iter().all(|&v| v == 255));
        assert_eq!(engine.live_buffers(), 2);
    }

    #[test]
    fn test_use_after_delete_is_a_fault() {
        let engine = SoftwareEngine::new();
        let mat = engine.mat_filled(1, 1, MatType::Cv8UC1, 0).unwrap();
        engine.mat_delete(mat);
        assert!(engine.mat_info(mat).is_err());
        assert_eq!(engine.live_buffers(), 0);
    }

    #[test]
    fn test_find_and_draw_square() {
        let engine = SoftwareEngine::new();
        let mut pixels = vec![0u8; 8 * 8];
        for y in 2..6 {
            for x in 2..6 {
                pixels[y * 8 + x] = 255;
            }
        }
        let image = engine.mat_from_data(8, 8, MatType::Cv8UC1, &pixels).unwrap();
        let contours = engine.vector_new();
        let hierarchy = engine.mat_empty();
        engine
            .find_contours(
                image,
                contours,
                hierarchy,
                ContourApproximation::Simple,
                Point::default(),
            )
            .unwrap();
        assert_eq!(engine.vector_len(contours).unwrap(), 1);
        assert_eq!(engine.storage.lock().vectors[&contours.raw()][0].len(), 4);

        let out = engine.mat_filled(8, 8, MatType::Cv8UC3, 1).unwrap();
        engine
            .draw_contours(
                out,
                contours,
                0,
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                1,
                Some(hierarchy),
            )
            .unwrap();
        let data = engine.mat_data(out).unwrap();
        let green = data.chunks_exact(3).filter(|px| px == &[0, 255, 0]).count();
        assert_eq!(green, 12);
    }

    #[test]
    fn test_fs_duplicate_is_a_fault() {
        let engine = SoftwareEngine::new();
        engine
            .fs_create_data_file("/", "model.bin", b"abc", true, false)
            .unwrap();
        assert!(engine.fs_exists("/model.bin"));
        assert!(engine
            .fs_create_data_file("/", "model.bin", b"xyz", true, false)
            .is_err());
        assert_eq!(engine.fs_read_file("model.bin").unwrap(), b"abc");
        assert_eq!(engine.file_count(), 1);
    }
}
