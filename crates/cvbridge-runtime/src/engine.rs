//! The engine capability contract.

use crate::EngineResult;

/// Opaque handle to an engine-owned matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatHandle(u32);

impl MatHandle {
    /// Wrap a raw engine id.
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// The raw engine id.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Opaque handle to an engine-owned vector of point sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorHandle(u32);

impl VectorHandle {
    /// Wrap a raw engine id.
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// The raw engine id.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Element layout of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatType {
    /// 8-bit, 1 channel.
    Cv8UC1,

    /// 8-bit, 3 channels.
    Cv8UC3,

    /// 8-bit, 4 channels.
    Cv8UC4,

    /// 32-bit signed, 4 channels (contour hierarchy).
    Cv32SC4,
}

impl MatType {
    /// Number of channels per element.
    pub fn channels(self) -> usize {
        match self {
            Self::Cv8UC1 => 1,
            Self::Cv8UC3 => 3,
            Self::Cv8UC4 | Self::Cv32SC4 => 4,
        }
    }

    /// Bytes per element (all channels).
    pub fn elem_size(self) -> usize {
        match self {
            Self::Cv32SC4 => 16,
            other => other.channels(),
        }
    }
}

/// Shape and layout of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatInfo {
    pub rows: u32,
    pub cols: u32,
    pub mat_type: MatType,
}

impl MatInfo {
    /// Returns true for a matrix without elements.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Total byte length of the matrix data.
    pub fn byte_len(&self) -> usize {
        self.rows as usize * self.cols as usize * self.mat_type.elem_size()
    }
}

/// Color space conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConversion {
    Rgba2Gray,
    Rgb2Gray,
    Gray2Rgba,
    Rgb2Rgba,
}

/// Contour point approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourApproximation {
    /// Every border pixel.
    None,

    /// Compress horizontal, vertical and diagonal runs to their end points.
    Simple,
}

/// A 2D integer point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A four-component color value, in channel order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scalar(pub [f64; 4]);

impl Scalar {
    pub const fn new(c0: f64, c1: f64, c2: f64, c3: f64) -> Self {
        Self([c0, c1, c2, c3])
    }

    /// Saturate each component into a byte.
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.map(|c| c.round().clamp(0.0, 255.0) as u8)
    }
}

/// Capabilities of an in-process vision engine.
///
/// Every buffer the engine hands out is owned by the engine until it is
/// explicitly deleted; there is no collection on the engine side. Handles
/// passed to the algorithm calls must be live.
pub trait VisionEngine: Send + Sync {
    /// Engine name for diagnostics.
    fn name(&self) -> &str;

    /// Engine build version.
    fn version(&self) -> &str;

    /// Allocate an empty matrix.
    fn mat_empty(&self) -> MatHandle;

    /// Allocate a matrix initialized from host bytes.
    fn mat_from_data(
        &self,
        rows: u32,
        cols: u32,
        mat_type: MatType,
        data: &[u8],
    ) -> EngineResult<MatHandle>;

    /// Allocate a matrix with every byte set to `value`.
    fn mat_filled(&self, rows: u32, cols: u32, mat_type: MatType, value: u8)
        -> EngineResult<MatHandle>;

    /// Set every element of a matrix.
    fn mat_set_to(&self, mat: MatHandle, value: Scalar) -> EngineResult<()>;

    /// Shape of a matrix.
    fn mat_info(&self, mat: MatHandle) -> EngineResult<MatInfo>;

    /// Copy the matrix data out to the host.
    fn mat_data(&self, mat: MatHandle) -> EngineResult<Vec<u8>>;

    /// Release a matrix. Unknown handles are ignored.
    fn mat_delete(&self, mat: MatHandle);

    /// Allocate an empty point-sequence vector.
    fn vector_new(&self) -> VectorHandle;

    /// Number of sequences in a vector.
    fn vector_len(&self, vector: VectorHandle) -> EngineResult<usize>;

    /// Release a vector. Unknown handles are ignored.
    fn vector_delete(&self, vector: VectorHandle);

    /// Number of matrices and vectors currently allocated.
    fn live_buffers(&self) -> usize;

    /// Convert between color spaces, (re)allocating `dst` as needed.
    fn cvt_color(&self, src: MatHandle, dst: MatHandle, code: ColorConversion)
        -> EngineResult<()>;

    /// Binary threshold: elements above `thresh` become `max_value`, the
    /// rest zero. (Re)allocates `dst` as needed.
    fn threshold(&self, src: MatHandle, dst: MatHandle, thresh: f64, max_value: f64)
        -> EngineResult<f64>;

    /// Find contours in a single-channel image; non-zero pixels are foreground.
    ///
    /// The hierarchy has two levels: every outer boundary is top level and
    /// each hole hangs off the outer boundary enclosing it.
    fn find_contours(
        &self,
        image: MatHandle,
        contours: VectorHandle,
        hierarchy: MatHandle,
        method: ContourApproximation,
        offset: Point,
    ) -> EngineResult<()>;

    /// Draw one contour (and, with a hierarchy, its nested contours), or all
    /// contours when `index` is negative. Lines are 8-connected.
    #[allow(clippy::too_many_arguments)]
    fn draw_contours(
        &self,
        image: MatHandle,
        contours: VectorHandle,
        index: i32,
        color: Scalar,
        thickness: i32,
        hierarchy: Option<MatHandle>,
    ) -> EngineResult<()>;

    /// Create a file in the virtual filesystem.
    fn fs_create_data_file(
        &self,
        parent: &str,
        name: &str,
        data: &[u8],
        can_read: bool,
        can_write: bool,
    ) -> EngineResult<()>;

    /// Read a file from the virtual filesystem.
    fn fs_read_file(&self, path: &str) -> EngineResult<Vec<u8>>;

    /// Check whether a path exists in the virtual filesystem.
    fn fs_exists(&self, path: &str) -> bool;

    /// Resolve an exception handle to its message.
    fn exception_from_ptr(&self, ptr: u64) -> Option<String>;
}
