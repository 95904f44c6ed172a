//! Reference processing pipeline: contour extraction.

use cvbridge_runtime::{
    ColorConversion, ContourApproximation, EngineFault, EngineHandle, EngineResult, Mat, MatType,
    MatVector, Point, Scalar,
};
use tracing::{debug, instrument, trace};

/// Binary threshold cutoff.
pub const THRESHOLD: f64 = 120.0;

/// Value written for pixels above the cutoff.
pub const THRESHOLD_MAX_VALUE: f64 = 200.0;

/// Background of the output: a fresh matrix of ones, which sets only the
/// first channel.
pub const BACKGROUND: Scalar = Scalar::new(1.0, 0.0, 0.0, 0.0);

/// Contour stroke color.
pub const CONTOUR_COLOR: Scalar = Scalar::new(0.0, 255.0, 0.0, 0.0);

/// Engine buffers reused across pipeline runs.
///
/// Buffers are replaced only when the frame size changes.
pub struct PipelineContext {
    engine: EngineHandle,
    size: Option<(u32, u32)>,
    gray: Mat,
    binary: Mat,
    output: Option<Mat>,
}

impl PipelineContext {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            gray: Mat::empty(&engine),
            binary: Mat::empty(&engine),
            output: None,
            size: None,
            engine,
        }
    }

    /// Size the buffers for `width`×`height` frames.
    ///
    /// Returns true when the buffers were reallocated. Old buffers are
    /// released before their replacements are allocated.
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<bool> {
        if self.size == Some((width, height)) {
            return Ok(false);
        }
        debug!(width, height, "Reallocating pipeline buffers");

        // Gray and binary are resized by the engine as they are written.
        self.output = None;
        self.size = None;

        self.output = Some(Mat::ones(&self.engine, height, width, MatType::Cv8UC3)?);
        self.size = Some((width, height));
        Ok(true)
    }

    pub fn output(&self) -> Option<&Mat> {
        self.output.as_ref()
    }

    /// Number of output buffers currently allocated (0 or 1).
    pub fn live_output_buffers(&self) -> usize {
        usize::from(self.output.is_some())
    }
}

/// Counts from the last run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContourSummary {
    pub contours: usize,

    /// Contours with no parent.
    pub external: usize,
}

/// Grayscale, threshold, find contours, draw them.
pub struct ContourPipeline {
    context: PipelineContext,
    last: ContourSummary,
}

impl ContourPipeline {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            context: PipelineContext::new(engine),
            last: ContourSummary::default(),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn last_summary(&self) -> ContourSummary {
        self.last
    }

    pub fn live_output_buffers(&self) -> usize {
        self.context.live_output_buffers()
    }

    /// Draw the contours of `source` in green on a `height`×`width`×3
    /// buffer of [`BACKGROUND`].
    ///
    /// `source` is RGBA or RGB. The returned buffer belongs to the pipeline
    /// and is overwritten by the next run.
    #[instrument(name = "extract_contours", skip(self, source))]
    pub fn extract_contours(&mut self, source: &Mat, width: u32, height: u32) -> EngineResult<&Mat> {
        let reallocated = self.context.resize(width, height)?;
        let ctx = &self.context;
        let engine = &ctx.engine;

        let code = match source.info()?.mat_type {
            MatType::Cv8UC3 => ColorConversion::Rgb2Gray,
            _ => ColorConversion::Rgba2Gray,
        };
        engine.cvt_color(source.handle(), ctx.gray.handle(), code)?;
        engine.threshold(
            ctx.gray.handle(),
            ctx.binary.handle(),
            THRESHOLD,
            THRESHOLD_MAX_VALUE,
        )?;

        let contours = MatVector::new(engine);
        let hierarchy = Mat::empty(engine);
        engine.find_contours(
            ctx.binary.handle(),
            contours.handle(),
            hierarchy.handle(),
            ContourApproximation::Simple,
            Point::default(),
        )?;

        let Some(output) = ctx.output.as_ref() else {
            return Err(EngineFault::Message("pipeline output not allocated".into()));
        };
        if !reallocated {
            output.set_to(BACKGROUND)?;
        }

        let count = contours.len()?;
        for i in 0..count {
            engine.draw_contours(
                output.handle(),
                contours.handle(),
                i as i32,
                CONTOUR_COLOR,
                1,
                Some(hierarchy.handle()),
            )?;
        }

        let external = hierarchy
            .hierarchy_entries()?
            .iter()
            .filter(|entry| entry[3] < 0)
            .count();
        self.last = ContourSummary {
            contours: count,
            external,
        };
        trace!(contours = count, external, "Contours drawn");

        // `contours` and `hierarchy` are released here.
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvbridge_runtime::SoftwareEngine;
    use std::sync::Arc;

    const GREEN: [u8; 3] = [0, 255, 0];

    fn engine() -> EngineHandle {
        Arc::new(SoftwareEngine::new())
    }

    /// RGBA frame of `fill`, with an optional rectangle of `rect_fill`.
    fn frame(
        engine: &EngineHandle,
        w: u32,
        h: u32,
        fill: u8,
        rect: Option<(u32, u32, u32, u32, u8)>,
    ) -> Mat {
        let mut data = vec![0u8; (w * h * 4) as usize];
        for y in 0..h {
            for x in 0..w {
                let v = match rect {
                    Some((x0, y0, x1, y1, v)) if (x0..x1).contains(&x) && (y0..y1).contains(&y) => v,
                    _ => fill,
                };
                let i = ((y * w + x) * 4) as usize;
                data[i..i + 3].fill(v);
                data[i + 3] = 255;
            }
        }
        Mat::from_rgba(engine, w, h, &data).unwrap()
    }

    fn green_pixels(output: &Mat) -> usize {
        output
            .data()
            .unwrap()
            .chunks_exact(3)
            .filter(|px| *px == GREEN)
            .count()
    }

    #[test]
    fn test_blank_frame_gives_background_only() {
        let engine = engine();
        let mut pipeline = ContourPipeline::new(Arc::clone(&engine));
        let source = frame(&engine, 100, 100, 0, None);

        let output = pipeline.extract_contours(&source, 100, 100).unwrap();
        let info = output.info().unwrap();
        assert_eq!((info.rows, info.cols, info.mat_type), (100, 100, MatType::Cv8UC3));
        assert!(output
            .data()
            .unwrap()
            .chunks_exact(3)
            .all(|px| px == [1, 0, 0]));
        assert_eq!(pipeline.last_summary().contours, 0);
    }

    #[test]
    fn test_dark_rectangle_gives_one_external_contour() {
        let engine = engine();
        let mut pipeline = ContourPipeline::new(Arc::clone(&engine));
        let source = frame(&engine, 60, 40, 230, Some((20, 10, 40, 30, 20)));

        let output = pipeline.extract_contours(&source, 60, 40).unwrap();
        assert!(green_pixels(output) > 0);
        assert_eq!(pipeline.last_summary().external, 1);
    }

    #[test]
    fn test_output_buffers_stay_bounded() {
        let engine = engine();
        let mut pipeline = ContourPipeline::new(Arc::clone(&engine));

        let mut baseline = None;
        for i in 0..25 {
            let source = frame(&engine, 32, 24, 230, Some((4 + i % 8, 4, 20, 16, 10)));
            pipeline.extract_contours(&source, 32, 24).unwrap();
            drop(source);
            assert_eq!(pipeline.live_output_buffers(), 1);
            let live = engine.live_buffers();
            assert_eq!(*baseline.get_or_insert(live), live, "leak on run {i}");
        }
    }

    #[test]
    fn test_same_size_reuses_buffers_and_resets_background() {
        let engine = engine();
        let mut pipeline = ContourPipeline::new(Arc::clone(&engine));

        let busy = frame(&engine, 20, 20, 230, Some((5, 5, 15, 15, 10)));
        let first = pipeline.extract_contours(&busy, 20, 20).unwrap().handle();

        let blank = frame(&engine, 20, 20, 0, None);
        let output = pipeline.extract_contours(&blank, 20, 20).unwrap();
        assert_eq!(output.handle(), first);
        assert_eq!(green_pixels(output), 0);
        assert!(output
            .data()
            .unwrap()
            .chunks_exact(3)
            .all(|px| px == [1, 0, 0]));
    }

    #[test]
    fn test_resize_replaces_output() {
        let engine = engine();
        let mut context = PipelineContext::new(Arc::clone(&engine));
        assert_eq!(context.live_output_buffers(), 0);
        assert!(context.resize(8, 8).unwrap());
        assert!(!context.resize(8, 8).unwrap());
        let before = engine.live_buffers();
        assert!(context.resize(16, 4).unwrap());
        assert_eq!(engine.live_buffers(), before);
        let info = context.output().unwrap().info().unwrap();
        assert_eq!((info.rows, info.cols), (4, 16));
    }
}
