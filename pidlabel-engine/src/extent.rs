//! 标签片段在绘图坐标下的外框。

use pidlabel_config::{ExtentConfig, InsertExtentConfig, TextPaddingConfig};
use pidlabel_core::geometry::{Bounds2D, Point2};
use pidlabel_core::glyph::GlyphMetrics;
use tracing::debug;

use crate::classify::{LabelCandidate, LabelSource, Orientation};
use crate::round_to;
use crate::transform::DrawingBox;

/// 根据字形外框与来源计算片段外框；插入点只作位置参考。
pub fn extract_bbox(
    candidate: &LabelCandidate,
    metrics: &dyn GlyphMetrics,
    config: &ExtentConfig,
) -> DrawingBox {
    let outline = metrics.outline_bounds(&candidate.run()).unwrap_or_else(|| {
        debug!(text = %candidate.raw_text, "字形外框为空，退化为插入点");
        Bounds2D::from_corners(candidate.geometry.insert, candidate.geometry.insert)
    });

    match candidate.source {
        LabelSource::Insert => insert_box(candidate, &outline, &config.insert),
        LabelSource::Text => {
            let padding = match candidate.orientation() {
                Orientation::Horizontal => &config.text_horizontal,
                Orientation::Vertical => &config.text_vertical,
            };
            text_box(&outline, padding)
        }
    }
}

/// 块属性标签以块参照插入点为中心，尺寸去除块缩放后再修剪。
fn insert_box(
    candidate: &LabelCandidate,
    outline: &Bounds2D,
    config: &InsertExtentConfig,
) -> DrawingBox {
    let mut width = outline.width() / config.descale_x;
    let mut height = outline.height() / config.descale_y;
    match candidate.orientation() {
        Orientation::Horizontal => width -= config.horizontal_width_trim,
        Orientation::Vertical => height -= config.vertical_height_trim,
    }
    let center = Point2::new(
        round_to(candidate.position.x(), 3),
        round_to(candidate.position.y(), 3),
    );
    DrawingBox::centered(center, width.max(0.0), height.max(0.0))
}

fn text_box(outline: &Bounds2D, padding: &TextPaddingConfig) -> DrawingBox {
    let lower_left = Point2::new(
        outline.min().x() + padding.shift_x,
        outline.min().y() + padding.shift_y,
    );
    let width = outline.width() / padding.width_divisor + padding.width_offset;
    let height = outline.height() / padding.height_divisor + padding.height_offset;
    DrawingBox::from_origin_size(lower_left, width.max(0.0), height.max(0.0))
}
