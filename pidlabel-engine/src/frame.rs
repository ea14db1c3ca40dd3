//! 图框识别：确定图纸页面在绘图坐标系下的原点与尺寸。

use pidlabel_config::FrameConfig;
use pidlabel_core::document::{Document, Entity, EntityKind};
use pidlabel_core::geometry::{Bounds2D, Point2};
use tracing::debug;

use crate::errors::FrameError;
use crate::round_to;

/// 图框来源，便于排查识别结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Face,
    TitleBlock,
    Polyline,
    Lines,
}

/// 图纸页面：原点为最小角点，宽高均为正。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    origin: Point2,
    width: f64,
    height: f64,
    source: FrameSource,
}

impl Frame {
    pub fn new(
        origin: Point2,
        width: f64,
        height: f64,
        source: FrameSource,
    ) -> Result<Self, FrameError> {
        if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        Ok(Self {
            origin,
            width,
            height,
            source,
        })
    }

    #[inline]
    pub fn origin(&self) -> Point2 {
        self.origin
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[inline]
    pub fn source(&self) -> FrameSource {
        self.source
    }

    pub fn extent(&self) -> Bounds2D {
        Bounds2D::new(
            self.origin,
            Point2::new(self.origin.x() + self.width, self.origin.y() + self.height),
        )
    }

    #[inline]
    fn diagonal(&self) -> f64 {
        self.width.hypot(self.height)
    }
}

/// 依次尝试 3DFACE、图签块、闭合四边形多段线/水平线，首个非空候选集胜出。
pub fn resolve_frame(document: &Document, config: &FrameConfig) -> Result<Frame, FrameError> {
    let decimals = config.decimals;

    if let Some(frame) = largest_face(document, decimals) {
        debug!(width = frame.width, height = frame.height, "图框取自 3DFACE");
        return Ok(frame);
    }

    if let Some(frame) = title_block_extent(document, config, decimals) {
        debug!(width = frame.width, height = frame.height, "图框取自图签块");
        return Ok(frame);
    }

    let polyline = largest_polyline(document, decimals);
    let lines = horizontal_line_span(document, decimals);
    let frame = match (polyline, lines) {
        (Some(polyline), Some(lines)) => {
            if lines.width > polyline.width {
                lines
            } else {
                polyline
            }
        }
        (Some(frame), None) | (None, Some(frame)) => frame,
        (None, None) => return Err(FrameError::NoFrameFound),
    };
    debug!(
        width = frame.width,
        height = frame.height,
        source = ?frame.source,
        "图框取自多段线/水平线"
    );
    Ok(frame)
}

fn quad_frame(
    vertices: [Point2; 4],
    decimals: u32,
    source: FrameSource,
) -> Option<Frame> {
    let width = round_to((vertices[2].x() - vertices[0].x()).abs(), decimals);
    let height = round_to((vertices[2].y() - vertices[0].y()).abs(), decimals);
    let mut bounds = Bounds2D::empty();
    for vertex in vertices {
        bounds.include_point(vertex);
    }
    let origin = Point2::new(
        round_to(bounds.min().x(), decimals),
        round_to(bounds.min().y(), decimals),
    );
    Frame::new(origin, width, height, source).ok()
}

fn pick_largest(candidates: impl Iterator<Item = Frame>) -> Option<Frame> {
    candidates.fold(None, |best: Option<Frame>, candidate| match best {
        Some(current) if current.diagonal() >= candidate.diagonal() => Some(current),
        _ => Some(candidate),
    })
}

fn largest_face(document: &Document, decimals: u32) -> Option<Frame> {
    let faces = document
        .query(EntityKind::Face)
        .filter_map(|(_, entity)| match entity {
            Entity::Face3D(face) => Some(face.vertices.map(|vertex| vertex.xy())),
            _ => None,
        })
        .filter_map(|vertices| quad_frame(vertices, decimals, FrameSource::Face));
    pick_largest(faces)
}

fn title_block_extent(document: &Document, config: &FrameConfig, decimals: u32) -> Option<Frame> {
    let mut bounds = Bounds2D::empty();
    for (_, entity) in document.query(EntityKind::Insert) {
        let Entity::BlockReference(reference) = entity else {
            continue;
        };
        if !config.title_blocks.iter().any(|name| name == &reference.name) {
            continue;
        }
        if let Some(extent) = document.block_reference_bounds(reference) {
            bounds.include_bounds(&extent);
        }
    }
    if bounds.is_empty() {
        return None;
    }
    let origin = Point2::new(
        round_to(bounds.min().x(), decimals),
        round_to(bounds.min().y(), decimals),
    );
    Frame::new(
        origin,
        round_to(bounds.width(), decimals),
        round_to(bounds.height(), decimals),
        FrameSource::TitleBlock,
    )
    .ok()
}

fn largest_polyline(document: &Document, decimals: u32) -> Option<Frame> {
    let polylines = document
        .query(EntityKind::Polyline)
        .filter_map(|(_, entity)| match entity {
            Entity::Polyline(polyline) if polyline.is_closed && polyline.vertices.len() == 4 => {
                Some([
                    polyline.vertices[0].position,
                    polyline.vertices[1].position,
                    polyline.vertices[2].position,
                    polyline.vertices[3].position,
                ])
            }
            _ => None,
        })
        .filter_map(|vertices| quad_frame(vertices, decimals, FrameSource::Polyline));
    pick_largest(polylines)
}

/// 水平线：取起点最靠左下的一条的起点，与终点最靠右上的一条的终点。
fn horizontal_line_span(document: &Document, decimals: u32) -> Option<Frame> {
    let mut lower_left: Option<Point2> = None;
    let mut upper_right: Option<Point2> = None;
    for (_, entity) in document.query(EntityKind::Line) {
        let Entity::Line(line) = entity else {
            continue;
        };
        if !line.is_horizontal() {
            continue;
        }
        let start = line.start;
        let end = line.end;
        if lower_left.is_none_or(|current| (start.x(), start.y()) < (current.x(), current.y())) {
            lower_left = Some(start);
        }
        if upper_right.is_none_or(|current| (end.x(), end.y()) > (current.x(), current.y())) {
            upper_right = Some(end);
        }
    }

    let (lower_left, upper_right) = (lower_left?, upper_right?);
    let origin = Point2::new(
        round_to(lower_left.x(), decimals),
        round_to(lower_left.y(), decimals),
    );
    let width = round_to(round_to(upper_right.x(), decimals) - origin.x(), decimals);
    let height = round_to(round_to(upper_right.y(), decimals) - origin.y(), decimals);
    Frame::new(origin, width, height, FrameSource::Lines).ok()
}
