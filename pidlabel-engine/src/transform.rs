//! 坐标变换：绘图坐标 → 图框比例 → 栅格像素。
//!
//! 三种坐标空间各有独立的包装类型，每一步变换都返回新值，
//! 左下角始终为各自空间的最小角点。

use glam::{DMat3, DVec2};
use pidlabel_core::geometry::{Bounds2D, Point2};

use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::round_to;

/// 绘图坐标系下的轴对齐外框。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawingBox {
    lower_left: Point2,
    upper_right: Point2,
}

impl DrawingBox {
    pub fn new(a: Point2, b: Point2) -> Self {
        let bounds = Bounds2D::from_corners(a, b);
        Self {
            lower_left: bounds.min(),
            upper_right: bounds.max(),
        }
    }

    pub fn from_origin_size(lower_left: Point2, width: f64, height: f64) -> Self {
        Self::new(
            lower_left,
            Point2::new(lower_left.x() + width, lower_left.y() + height),
        )
    }

    pub fn centered(center: Point2, width: f64, height: f64) -> Self {
        Self::new(
            Point2::new(center.x() - width / 2.0, center.y() - height / 2.0),
            Point2::new(center.x() + width / 2.0, center.y() + height / 2.0),
        )
    }

    #[inline]
    pub fn lower_left(&self) -> Point2 {
        self.lower_left
    }

    #[inline]
    pub fn upper_right(&self) -> Point2 {
        self.upper_right
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.upper_right.x() - self.lower_left.x()
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.upper_right.y() - self.lower_left.y()
    }
}

/// 相对图框的比例坐标，图框内取值落在 [0, 1]。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioBox {
    lower_left: DVec2,
    upper_right: DVec2,
}

impl RatioBox {
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            lower_left: a.min(b),
            upper_right: a.max(b),
        }
    }

    #[inline]
    pub fn lower_left(&self) -> DVec2 {
        self.lower_left
    }

    #[inline]
    pub fn upper_right(&self) -> DVec2 {
        self.upper_right
    }

    /// 左下角 X 比例超过阈值时视为贴近图框右缘（图签区域）。
    #[inline]
    pub fn exceeds_edge(&self, threshold: f64) -> bool {
        self.lower_left.x > threshold
    }
}

/// 栅格像素坐标（y 轴向下），`min` 为像素空间的最小角点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    min: DVec2,
    max: DVec2,
}

impl PixelBox {
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    #[inline]
    pub fn min(&self) -> DVec2 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> DVec2 {
        self.max
    }

    /// ICDAR 顺序的四个角点：左上、右上、右下、左下。
    pub fn quad(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }
}

pub fn to_ratio(drawing: &DrawingBox, frame: &Frame) -> RatioBox {
    let origin = frame.origin().as_vec2();
    let size = DVec2::new(frame.width(), frame.height());
    RatioBox::new(
        (drawing.lower_left.as_vec2() - origin) / size,
        (drawing.upper_right.as_vec2() - origin) / size,
    )
}

pub fn from_ratio(ratio: &RatioBox, frame: &Frame) -> DrawingBox {
    let origin = frame.origin().as_vec2();
    let size = DVec2::new(frame.width(), frame.height());
    DrawingBox::new(
        Point2::from_vec(ratio.lower_left * size + origin),
        Point2::from_vec(ratio.upper_right * size + origin),
    )
}

/// 渲染时绘图坐标轴的显示范围。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxesLimits {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl AxesLimits {
    /// 坐标轴恰好覆盖图框，等价于在比例坐标上使用单位坐标轴。
    pub fn from_frame(frame: &Frame) -> Self {
        let extent = frame.extent();
        Self {
            x1: extent.min().x(),
            x2: extent.max().x(),
            y1: extent.min().y(),
            y2: extent.max().y(),
        }
    }

    pub fn from_array([x1, x2, y1, y2]: [f64; 4]) -> Self {
        Self { x1, x2, y1, y2 }
    }

    fn is_degenerate(&self) -> bool {
        let width = self.x2 - self.x1;
        let height = self.y2 - self.y1;
        !(width.is_finite() && height.is_finite()) || width == 0.0 || height == 0.0
    }
}

/// 栅格目标：像素尺寸与可选的坐标轴范围（缺省取图框）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterTarget {
    width_px: u32,
    height_px: u32,
    axes: Option<AxesLimits>,
}

impl RasterTarget {
    pub fn new(width_px: u32, height_px: u32) -> Result<Self, PipelineError> {
        if width_px == 0 || height_px == 0 {
            return Err(PipelineError::InvalidRaster {
                width_px,
                height_px,
            });
        }
        Ok(Self {
            width_px,
            height_px,
            axes: None,
        })
    }

    pub fn with_axes(mut self, axes: AxesLimits) -> Self {
        self.axes = Some(axes);
        self
    }

    #[inline]
    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    #[inline]
    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    fn axes_for(&self, frame: &Frame) -> AxesLimits {
        match self.axes {
            Some(axes) if !axes.is_degenerate() => axes,
            _ => AxesLimits::from_frame(frame),
        }
    }

    /// 绘图坐标到像素坐标的仿射矩阵 `T(0, H+1) · S(W/(x2−x1), −H/(y2−y1)) · T(−x1, −y1)`。
    /// 多出的 1 个像素抵消 y 轴翻转的偏移。
    pub fn matrix(&self, frame: &Frame) -> DMat3 {
        let axes = self.axes_for(frame);
        let width = f64::from(self.width_px);
        let height = f64::from(self.height_px);
        DMat3::from_translation(DVec2::new(0.0, height + 1.0))
            * DMat3::from_scale(DVec2::new(
                width / (axes.x2 - axes.x1),
                -height / (axes.y2 - axes.y1),
            ))
            * DMat3::from_translation(DVec2::new(-axes.x1, -axes.y1))
    }

    pub fn inverse_matrix(&self, frame: &Frame) -> DMat3 {
        self.matrix(frame).inverse()
    }

    /// 比例外框经图框还原到绘图坐标，再映射到像素；结果保留 3 位小数。
    pub fn to_pixels(&self, ratio: &RatioBox, frame: &Frame) -> PixelBox {
        let drawing = from_ratio(ratio, frame);
        let matrix = self.matrix(frame);
        let a = matrix.transform_point2(drawing.lower_left.as_vec2());
        let b = matrix.transform_point2(drawing.upper_right.as_vec2());
        PixelBox::new(round_vec(a), round_vec(b))
    }

    pub fn pixels_to_ratio(&self, pixels: &PixelBox, frame: &Frame) -> RatioBox {
        let inverse = self.inverse_matrix(frame);
        let a = Point2::from_vec(inverse.transform_point2(pixels.min));
        let b = Point2::from_vec(inverse.transform_point2(pixels.max));
        to_ratio(&DrawingBox::new(a, b), frame)
    }
}

#[inline]
fn round_vec(value: DVec2) -> DVec2 {
    DVec2::new(round_to(value.x, 3), round_to(value.y, 3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSource;

    fn frame(x: f64, y: f64, width: f64, height: f64) -> Frame {
        Frame::new(Point2::new(x, y), width, height, FrameSource::Face).expect("图框应有效")
    }

    fn assert_close(actual: DVec2, expected: (f64, f64)) {
        assert!(
            (actual.x - expected.0).abs() < 1e-9 && (actual.y - expected.1).abs() < 1e-9,
            "实际 {actual:?}，期望 {expected:?}"
        );
    }

    #[test]
    fn ratio_transform_is_relative_to_frame_origin() {
        let page = frame(100.0, 50.0, 200.0, 100.0);
        let drawing = DrawingBox::new(Point2::new(150.0, 75.0), Point2::new(300.0, 150.0));
        let ratio = to_ratio(&drawing, &page);
        assert_close(ratio.lower_left(), (0.25, 0.25));
        assert_close(ratio.upper_right(), (1.0, 1.0));

        let back = from_ratio(&ratio, &page);
        assert!((back.lower_left().x() - 150.0).abs() < 1e-9);
        assert!((back.upper_right().y() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn boxes_are_normalized_on_construction() {
        let drawing = DrawingBox::new(Point2::new(5.0, 9.0), Point2::new(1.0, 2.0));
        assert_eq!(drawing.lower_left(), Point2::new(1.0, 2.0));
        assert_eq!(drawing.upper_right(), Point2::new(5.0, 9.0));
        assert!((drawing.width() - 4.0).abs() < 1e-12);

        let pixels = PixelBox::new(DVec2::new(10.0, 2.0), DVec2::new(3.0, 8.0));
        assert_close(pixels.min(), (3.0, 2.0));
        assert_close(pixels.max(), (10.0, 8.0));
    }

    #[test]
    fn raster_transform_flips_y_axis() {
        let page = frame(0.0, 0.0, 100.0, 100.0);
        let target = RasterTarget::new(1000, 1000).expect("尺寸有效");
        let drawing = DrawingBox::new(Point2::new(10.0, 10.0), Point2::new(20.0, 20.0));
        let pixels = target.to_pixels(&to_ratio(&drawing, &page), &page);
        assert_close(pixels.min(), (100.0, 801.0));
        assert_close(pixels.max(), (200.0, 901.0));
    }

    #[test]
    fn raster_transform_with_offset_frame_matches_unit_axes() {
        let page = frame(50.0, 20.0, 841.0, 594.0);
        let target = RasterTarget::new(4000, 2800).expect("尺寸有效");
        let ratio = RatioBox::new(DVec2::new(0.5, 0.25), DVec2::new(0.75, 0.5));
        let pixels = target.to_pixels(&ratio, &page);
        assert_close(pixels.min(), (2000.0, 2801.0 - 1400.0));
        assert_close(pixels.max(), (3000.0, 2801.0 - 700.0));
    }

    #[test]
    fn explicit_axes_override_frame() {
        let page = frame(0.0, 0.0, 100.0, 100.0);
        let target = RasterTarget::new(100, 100)
            .expect("尺寸有效")
            .with_axes(AxesLimits::from_array([0.0, 200.0, 0.0, 200.0]));
        let ratio = RatioBox::new(DVec2::new(0.0, 0.0), DVec2::new(1.0, 1.0));
        let pixels = target.to_pixels(&ratio, &page);
        assert_close(pixels.min(), (0.0, 51.0));
        assert_close(pixels.max(), (50.0, 101.0));
    }

    #[test]
    fn inverse_matrix_recovers_ratio_box() {
        let page = frame(10.0, 10.0, 400.0, 300.0);
        let target = RasterTarget::new(2000, 1500).expect("尺寸有效");
        let ratio = RatioBox::new(DVec2::new(0.125, 0.5), DVec2::new(0.25, 0.625));
        let back = target.pixels_to_ratio(&target.to_pixels(&ratio, &page), &page);
        assert!((back.lower_left() - ratio.lower_left()).abs().max_element() < 1e-6);
        assert!((back.upper_right() - ratio.upper_right()).abs().max_element() < 1e-6);
    }

    #[test]
    fn zero_sized_raster_is_rejected() {
        assert!(matches!(
            RasterTarget::new(0, 10),
            Err(PipelineError::InvalidRaster { width_px: 0, height_px: 10 })
        ));
    }

    #[test]
    fn pixel_quad_runs_clockwise_from_top_left() {
        let pixels = PixelBox::new(DVec2::new(100.0, 801.0), DVec2::new(200.0, 901.0));
        let [tl, tr, br, bl] = pixels.quad();
        assert_close(tl, (100.0, 801.0));
        assert_close(tr, (200.0, 801.0));
        assert_close(br, (200.0, 901.0));
        assert_close(bl, (100.0, 901.0));
    }

    #[test]
    fn edge_threshold_uses_lower_left_x() {
        let inside = RatioBox::new(DVec2::new(0.84, 0.1), DVec2::new(0.9, 0.2));
        let outside = RatioBox::new(DVec2::new(0.841, 0.1), DVec2::new(0.9, 0.2));
        assert!(!inside.exceeds_edge(0.84));
        assert!(outside.exceeds_edge(0.84));
    }
}
