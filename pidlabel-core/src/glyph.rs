//! 文字外框估算。
//!
//! 管线需要每段文字在图纸坐标下的可见墨迹范围。真实字体轮廓不可得时，
//! 以笔画字体的字宽比例近似：按字符类别累加步进宽度，结合字高、宽度因子、
//! DXF 对齐方式与旋转角计算轴对齐外框。

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2};

/// 一段待排版的文字，字段语义与 DXF TEXT/ATTRIB 一致，`rotation` 为弧度。
#[derive(Debug, Clone, Copy)]
pub struct TextRun<'a> {
    pub content: &'a str,
    pub insert: Point2,
    pub alignment: Option<Point2>,
    pub height: f64,
    pub width_factor: f64,
    pub rotation: f64,
    pub horizontal_align: i16,
    pub vertical_align: i16,
}

/// 字形度量接口，可替换为基于真实字体的实现。
pub trait GlyphMetrics: Send + Sync {
    /// 返回文字可见墨迹的轴对齐外框；内容为空或全为空白时返回 `None`。
    fn outline_bounds(&self, run: &TextRun<'_>) -> Option<Bounds2D>;
}

/// 默认笔画字体度量，所有比例均相对于字高。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeFontMetrics {
    #[serde(default = "default_regular_advance")]
    pub regular_advance: f64,
    #[serde(default = "default_narrow_advance")]
    pub narrow_advance: f64,
    #[serde(default = "default_space_advance")]
    pub space_advance: f64,
    #[serde(default = "default_cap_height")]
    pub cap_height: f64,
    #[serde(default = "default_descender")]
    pub descender: f64,
}

const NARROW_GLYPHS: &str = "1Iijl.,:;'\"|!-()[]{}`";
const DESCENDING_GLYPHS: &str = "gjpqy,;()[]{}";

fn default_regular_advance() -> f64 {
    0.9
}

fn default_narrow_advance() -> f64 {
    0.5
}

fn default_space_advance() -> f64 {
    0.44
}

fn default_cap_height() -> f64 {
    1.0
}

fn default_descender() -> f64 {
    0.3
}

impl Default for StrokeFontMetrics {
    fn default() -> Self {
        Self {
            regular_advance: default_regular_advance(),
            narrow_advance: default_narrow_advance(),
            space_advance: default_space_advance(),
            cap_height: default_cap_height(),
            descender: default_descender(),
        }
    }
}

impl StrokeFontMetrics {
    #[inline]
    fn advance(&self, ch: char) -> f64 {
        if ch.is_whitespace() {
            self.space_advance
        } else if NARROW_GLYPHS.contains(ch) {
            self.narrow_advance
        } else {
            self.regular_advance
        }
    }

    fn advance_of(&self, text: &str) -> f64 {
        text.chars().map(|ch| self.advance(ch)).sum()
    }
}

impl GlyphMetrics for StrokeFontMetrics {
    fn outline_bounds(&self, run: &TextRun<'_>) -> Option<Bounds2D> {
        let trimmed = run.content.trim();
        if trimmed.is_empty() || run.height <= 0.0 {
            return None;
        }

        let width_factor = if run.width_factor > 0.0 { run.width_factor } else { 1.0 };
        let unit = run.height * width_factor;
        let leading = run.content.len() - run.content.trim_start().len();
        let mut ink_start = self.advance_of(&run.content[..leading]) * unit;
        let mut ink_end = self.advance_of(run.content.trim_end()) * unit;
        let total = self.advance_of(run.content) * unit;

        let cap = self.cap_height * run.height;
        let descent = if trimmed.chars().any(|ch| DESCENDING_GLYPHS.contains(ch)) {
            self.descender * run.height
        } else {
            0.0
        };

        // 0/0 为左下基线对齐，DXF 此时忽略第二对齐点
        let mut anchor = if run.horizontal_align == 0 && run.vertical_align == 0 {
            run.insert
        } else {
            run.alignment.unwrap_or(run.insert)
        };
        let mut rotation = run.rotation;

        let x_offset = match run.horizontal_align {
            1 | 4 => -total / 2.0,
            2 => -total,
            3 | 5 => {
                // Aligned/Fit：文字铺满插入点到对齐点之间
                anchor = run.insert;
                if let Some(end) = run.alignment {
                    let span = anchor.vector_to(end);
                    let length = span.length_squared().sqrt();
                    if length > f64::EPSILON && total > f64::EPSILON {
                        let stretch = length / total;
                        ink_start *= stretch;
                        ink_end *= stretch;
                        rotation = span.y().atan2(span.x());
                    }
                }
                0.0
            }
            _ => 0.0,
        };

        let y_offset = if run.horizontal_align == 4 {
            -cap / 2.0
        } else {
            match run.vertical_align {
                1 => self.descender * run.height,
                2 => -cap / 2.0,
                3 => -cap,
                _ => 0.0,
            }
        };

        Some(rotated_box(
            anchor,
            rotation,
            (x_offset + ink_start, x_offset + ink_end),
            (y_offset - descent, y_offset + cap),
        ))
    }
}

fn rotated_box(anchor: Point2, rotation: f64, (x0, x1): (f64, f64), (y0, y1): (f64, f64)) -> Bounds2D {
    let mut bounds = Bounds2D::empty();
    for (x, y) in [(x0, y0), (x1, y0), (x1, y1), (x0, y1)] {
        let local = Point2::new(anchor.x() + x, anchor.y() + y);
        bounds.include_point(local.rotate_about(anchor, rotation));
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn run(content: &str) -> TextRun<'_> {
        TextRun {
            content,
            insert: Point2::new(10.0, 20.0),
            alignment: None,
            height: 2.0,
            width_factor: 1.0,
            rotation: 0.0,
            horizontal_align: 0,
            vertical_align: 0,
        }
    }

    #[test]
    fn left_baseline_text_starts_at_insert() {
        let metrics = StrokeFontMetrics::default();
        let bounds = metrics.outline_bounds(&run("AB")).expect("外框应存在");
        assert!((bounds.min().x() - 10.0).abs() < 1e-9);
        assert!((bounds.min().y() - 20.0).abs() < 1e-9);
        assert!((bounds.max().x() - (10.0 + 2.0 * 0.9 * 2.0)).abs() < 1e-9);
        assert!((bounds.max().y() - 22.0).abs() < 1e-9);
    }

    #[test]
    fn blank_text_has_no_outline() {
        let metrics = StrokeFontMetrics::default();
        assert!(metrics.outline_bounds(&run("   ")).is_none());
        assert!(metrics.outline_bounds(&run("")).is_none());
    }

    #[test]
    fn trailing_spaces_do_not_widen_ink() {
        let metrics = StrokeFontMetrics::default();
        let plain = metrics.outline_bounds(&run("AB")).expect("外框");
        let padded = metrics.outline_bounds(&run("AB   ")).expect("外框");
        assert_eq!(plain, padded);
    }

    #[test]
    fn vertical_text_rotates_about_insert() {
        let metrics = StrokeFontMetrics::default();
        let mut vertical = run("AB");
        vertical.rotation = FRAC_PI_2;
        let bounds = metrics.outline_bounds(&vertical).expect("外框");
        assert!((bounds.min().x() - 8.0).abs() < 1e-9);
        assert!((bounds.max().x() - 10.0).abs() < 1e-9);
        assert!((bounds.min().y() - 20.0).abs() < 1e-9);
        assert!((bounds.max().y() - (20.0 + 3.6)).abs() < 1e-9);
    }

    #[test]
    fn centered_text_is_anchored_on_alignment_point() {
        let metrics = StrokeFontMetrics::default();
        let mut centered = run("AB");
        centered.horizontal_align = 1;
        centered.alignment = Some(Point2::new(50.0, 20.0));
        let bounds = metrics.outline_bounds(&centered).expect("外框");
        assert!((bounds.center().x() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn wider_width_factor_widens_box() {
        let metrics = StrokeFontMetrics::default();
        let normal = metrics.outline_bounds(&run("-AD-")).expect("外框");
        let mut wide = run("-AD-");
        wide.width_factor = 1.5;
        let wide = metrics.outline_bounds(&wide).expect("外框");
        assert!(wide.width() > normal.width());
    }
}
