//! Owned wrappers around engine buffers.

use std::fmt;
use std::sync::Arc;

use crate::engine::{MatHandle, MatInfo, MatType, Scalar, VectorHandle, VisionEngine};
use crate::EngineResult;

/// Shared handle to a ready engine.
pub type EngineHandle = Arc<dyn VisionEngine>;

/// One row of a contour hierarchy: `[next, previous, first_child, parent]`,
/// `-1` where absent.
pub type HierarchyEntry = [i32; 4];

/// An engine matrix owned by the host. Released on drop.
pub struct Mat {
    engine: EngineHandle,
    handle: MatHandle,
}

impl Mat {
    /// Allocate an empty matrix.
    pub fn empty(engine: &EngineHandle) -> Self {
        Self {
            handle: engine.mat_empty(),
            engine: Arc::clone(engine),
        }
    }

    /// Copy host bytes into a new matrix.
    pub fn from_data(
        engine: &EngineHandle,
        rows: u32,
        cols: u32,
        mat_type: MatType,
        data: &[u8],
    ) -> EngineResult<Self> {
        let handle = engine.mat_from_data(rows, cols, mat_type, data)?;
        Ok(Self {
            engine: Arc::clone(engine),
            handle,
        })
    }

    /// Copy tightly packed RGBA pixels into a new `Cv8UC4` matrix.
    pub fn from_rgba(
        engine: &EngineHandle,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> EngineResult<Self> {
        Self::from_data(engine, height, width, MatType::Cv8UC4, data)
    }

    /// Allocate a matrix with every byte set to `value`.
    pub fn filled(
        engine: &EngineHandle,
        rows: u32,
        cols: u32,
        mat_type: MatType,
        value: u8,
    ) -> EngineResult<Self> {
        let handle = engine.mat_filled(rows, cols, mat_type, value)?;
        Ok(Self {
            engine: Arc::clone(engine),
            handle,
        })
    }

    /// Allocate a matrix whose first channel is one and every other
    /// channel zero.
    pub fn ones(
        engine: &EngineHandle,
        rows: u32,
        cols: u32,
        mat_type: MatType,
    ) -> EngineResult<Self> {
        let mat = Self::zeros(engine, rows, cols, mat_type)?;
        mat.set_to(Scalar::new(1.0, 0.0, 0.0, 0.0))?;
        Ok(mat)
    }

    /// Allocate a matrix of zeros.
    pub fn zeros(
        engine: &EngineHandle,
        rows: u32,
        cols: u32,
        mat_type: MatType,
    ) -> EngineResult<Self> {
        Self::filled(engine, rows, cols, mat_type, 0)
    }

    pub fn handle(&self) -> MatHandle {
        self.handle
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn info(&self) -> EngineResult<MatInfo> {
        self.engine.mat_info(self.handle)
    }

    /// Copy the matrix data out.
    pub fn data(&self) -> EngineResult<Vec<u8>> {
        self.engine.mat_data(self.handle)
    }

    pub fn set_to(&self, value: Scalar) -> EngineResult<()> {
        self.engine.mat_set_to(self.handle, value)
    }

    /// Decode a `Cv32SC4` hierarchy matrix.
    pub fn hierarchy_entries(&self) -> EngineResult<Vec<HierarchyEntry>> {
        let data = self.data()?;
        Ok(data
            .chunks_exact(16)
            .map(|chunk| {
                let mut entry = [0i32; 4];
                for (slot, bytes) in entry.iter_mut().zip(chunk.chunks_exact(4)) {
                    *slot = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
                entry
            })
            .collect())
    }

    /// Release the matrix now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Mat {
    fn drop(&mut self) {
        self.engine.mat_delete(self.handle);
    }
}

impl fmt::Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mat")
            .field("engine", &self.engine.name())
            .field("handle", &self.handle)
            .finish()
    }
}

/// An engine vector of point sequences owned by the host. Released on drop.
pub struct MatVector {
    engine: EngineHandle,
    handle: VectorHandle,
}

impl MatVector {
    pub fn new(engine: &EngineHandle) -> Self {
        Self {
            handle: engine.vector_new(),
            engine: Arc::clone(engine),
        }
    }

    pub fn handle(&self) -> VectorHandle {
        self.handle
    }

    pub fn len(&self) -> EngineResult<usize> {
        self.engine.vector_len(self.handle)
    }

    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Release the vector now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for MatVector {
    fn drop(&mut self) {
        self.engine.vector_delete(self.handle);
    }
}

impl fmt::Debug for MatVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatVector")
            .field("engine", &self.engine.name())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoftwareEngine;

    fn engine() -> EngineHandle {
        Arc::new(SoftwareEngine::new())
    }

    #[test]
    fn test_drop_releases_engine_buffer() {
        let engine = engine();
        {
            let _a = Mat::ones(&engine, 2, 2, MatType::Cv8UC3).unwrap();
            let _v = MatVector::new(&engine);
            assert_eq!(engine.live_buffers(), 2);
        }
        assert_eq!(engine.live_buffers(), 0);
    }

    #[test]
    fn test_ones_sets_only_the_first_channel() {
        let engine = engine();
        let rgb = Mat::ones(&engine, 1, 2, MatType::Cv8UC3).unwrap();
        assert_eq!(rgb.data().unwrap(), vec![1, 0, 0, 1, 0, 0]);
        let gray = Mat::ones(&engine, 1, 2, MatType::Cv8UC1).unwrap();
        assert_eq!(gray.data().unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_explicit_release() {
        let engine = engine();
        let mat = Mat::zeros(&engine, 3, 4, MatType::Cv8UC1).unwrap();
        let info = mat.info().unwrap();
        assert_eq!((info.rows, info.cols), (3, 4));
        mat.release();
        assert_eq!(engine.live_buffers(), 0);
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let engine = engine();
        assert!(Mat::from_rgba(&engine, 2, 2, &[0u8; 15]).is_err());
        assert_eq!(engine.live_buffers(), 0);
    }
}
