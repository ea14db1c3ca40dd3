pub mod glyph;

pub mod geometry {
    use glam::{DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，所有图纸坐标均为双精度。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        /// 绕 `pivot` 逆时针旋转 `angle`（弧度）。
        #[inline]
        pub fn rotate_about(self, pivot: Point2, angle: f64) -> Self {
            let offset = self.0 - pivot.0;
            Self(pivot.0 + DVec2::from_angle(angle).rotate(offset))
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维点，3DFACE 顶点使用；管线只关心 XY 投影。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn xy(self) -> Point2 {
            Point2::new(self.0.x, self.0.y)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于估算文档/实体范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        /// 由任意两个对角点构造，自动归一化为最小/最大角点。
        #[inline]
        pub fn from_corners(a: Point2, b: Point2) -> Self {
            Self {
                min: Point2::from_vec(a.as_vec2().min(b.as_vec2())),
                max: Point2::from_vec(a.as_vec2().max(b.as_vec2())),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        /// 按逆时针顺序返回四个角点（左下起）。
        pub fn corners(&self) -> [Point2; 4] {
            [
                self.min,
                Point2::new(self.max.x(), self.min.y()),
                self.max,
                Point2::new(self.min.x(), self.max.y()),
            ]
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point2 {
            debug_assert!(!self.is_empty());
            let center = (self.min.as_vec2() + self.max.as_vec2()) * 0.5;
            Point2::from_vec(center)
        }
    }
}

pub mod document {
    use std::collections::HashMap;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Bounds2D, Point2, Point3, Vector2};
    use crate::glyph::TextRun;

    /// 嵌套块参照展开的最大深度，防止自引用块导致死循环。
    const MAX_BLOCK_DEPTH: usize = 8;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
            }
        }
    }

    /// 模型空间查询使用的实体类别。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum EntityKind {
        Text,
        Insert,
        Face,
        Polyline,
        Line,
        Circle,
        Arc,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Polyline(Polyline),
        Text(Text),
        BlockReference(BlockReference),
        Face3D(ThreeDFace),
    }

    impl Entity {
        #[inline]
        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::Line(_) => EntityKind::Line,
                Entity::Circle(_) => EntityKind::Circle,
                Entity::Arc(_) => EntityKind::Arc,
                Entity::Polyline(_) => EntityKind::Polyline,
                Entity::Text(_) => EntityKind::Text,
                Entity::BlockReference(_) => EntityKind::Insert,
                Entity::Face3D(_) => EntityKind::Face,
            }
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::BlockReference(reference) => &reference.layer,
                Entity::Face3D(face) => &face.layer,
            }
        }

        /// DXF 句柄（组码 5），部分导出器不会写出。
        #[inline]
        pub fn handle(&self) -> Option<&str> {
            let handle = match self {
                Entity::Line(line) => &line.handle,
                Entity::Circle(circle) => &circle.handle,
                Entity::Arc(arc) => &arc.handle,
                Entity::Polyline(polyline) => &polyline.handle,
                Entity::Text(text) => &text.handle,
                Entity::BlockReference(reference) => &reference.handle,
                Entity::Face3D(face) => &face.handle,
            };
            handle.as_deref()
        }

        /// 计算实体的 2D 轴对齐范围，文本与块参照退化为插入点。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Line(line) => {
                    bounds.include_point(line.start);
                    bounds.include_point(line.end);
                }
                Entity::Circle(circle) => {
                    let radius = circle.radius.abs();
                    let center = circle.center;
                    bounds.include_point(Point2::new(center.x() - radius, center.y() - radius));
                    bounds.include_point(Point2::new(center.x() + radius, center.y() + radius));
                }
                Entity::Arc(arc) => {
                    arc_bounds(arc, &mut bounds);
                }
                Entity::Polyline(polyline) => {
                    for vertex in &polyline.vertices {
                        bounds.include_point(vertex.position);
                    }
                    let count = polyline.vertices.len();
                    let segments = if polyline.is_closed { count } else { count.saturating_sub(1) };
                    for index in 0..segments {
                        let start = &polyline.vertices[index];
                        let end = &polyline.vertices[(index + 1) % count];
                        polyline_segment_bounds(start.position, end.position, start.bulge, &mut bounds);
                    }
                }
                Entity::Text(text) => {
                    bounds.include_point(text.insert);
                }
                Entity::BlockReference(reference) => {
                    bounds.include_point(reference.insert);
                    for attr in &reference.attributes {
                        bounds.include_point(attr.insert);
                    }
                }
                Entity::Face3D(face) => {
                    for vertex in &face.vertices {
                        bounds.include_point(vertex.xy());
                    }
                }
            }
            if bounds.is_empty() { None } else { Some(bounds) }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    impl Line {
        /// 起终点 Y 完全相等视为水平线（图框边线判定）。
        #[inline]
        pub fn is_horizontal(&self) -> bool {
            self.end.y() - self.start.y() == 0.0
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    /// 圆弧实体，角度以弧度形式储存，遵循数学正方向。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    /// 单行文字（TEXT）。`rotation` 为弧度；对齐方式沿用 DXF 组码 72/73 的取值。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub width_factor: f64,
        pub horizontal_align: i16,
        pub vertical_align: i16,
        pub alignment: Option<Point2>,
        pub style: Option<String>,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    impl Text {
        #[inline]
        pub fn rotation_degrees(&self) -> f64 {
            self.rotation.to_degrees()
        }

        pub fn run(&self) -> TextRun<'_> {
            TextRun {
                content: &self.content,
                insert: self.insert,
                alignment: self.alignment,
                height: self.height,
                width_factor: self.width_factor,
                rotation: self.rotation,
                horizontal_align: self.horizontal_align,
                vertical_align: self.vertical_align,
            }
        }
    }

    /// 块参照上的属性（ATTRIB），坐标已是世界坐标。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Attribute {
        pub tag: String,
        pub text: String,
        pub insert: Point2,
        pub height: f64,
        pub rotation: f64,
        pub width_factor: f64,
        pub horizontal_align: i16,
        pub vertical_align: i16,
        pub alignment: Option<Point2>,
        pub style: Option<String>,
        pub is_invisible: bool,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    impl Attribute {
        pub fn run(&self) -> TextRun<'_> {
            TextRun {
                content: &self.text,
                insert: self.insert,
                alignment: self.alignment,
                height: self.height,
                width_factor: self.width_factor,
                rotation: self.rotation,
                horizontal_align: self.horizontal_align,
                vertical_align: self.vertical_align,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub attributes: Vec<Attribute>,
        pub layer: String,
        #[serde(default)]
        pub handle: Option<String>,
    }

    impl BlockReference {
        #[inline]
        pub fn rotation_degrees(&self) -> f64 {
            self.rotation.to_degrees()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    /// 3D 面（3DFACE），图框常以一个覆盖整页的四边面表达。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ThreeDFace {
        pub layer: String,
        pub vertices: [Point3; 4],
        /// DXF 组码 70 对应的隐蔽边标记：依次表示边 1-4。
        pub invisible_edges: [bool; 4],
        #[serde(default)]
        pub handle: Option<String>,
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Document {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        blocks: HashMap<String, BlockDefinition>,
    }

    impl Document {
        pub fn new() -> Self {
            let mut doc = Self::default();
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name());
            if let Entity::BlockReference(reference) = &entity {
                for attribute in &reference.attributes {
                    self.ensure_layer(&attribute.layer);
                }
            }
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        pub fn add_line(
            &mut self,
            start: Point2,
            end: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Line(Line {
                start,
                end,
                layer: layer.into(),
                handle: None,
            }))
        }

        pub fn add_polyline<I>(
            &mut self,
            points: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            let vertices = points.into_iter().map(PolylineVertex::new).collect();
            self.add_entity(Entity::Polyline(Polyline {
                vertices,
                is_closed,
                layer: layer.into(),
                handle: None,
            }))
        }

        /// 以左下对齐方式添加单行文字，`rotation` 为弧度。
        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Text(Text {
                insert,
                content: content.into(),
                height,
                rotation,
                width_factor: 1.0,
                horizontal_align: 0,
                vertical_align: 0,
                alignment: None,
                style: None,
                layer: layer.into(),
                handle: None,
            }))
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            attributes: Vec<Attribute>,
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                attributes,
                layer: layer.into(),
                handle: None,
            }))
        }

        pub fn add_face3d(
            &mut self,
            vertices: [Point3; 4],
            invisible_edges: [bool; 4],
            layer: impl Into<String>,
        ) -> EntityId {
            self.add_entity(Entity::Face3D(ThreeDFace {
                layer: layer.into(),
                vertices,
                invisible_edges,
                handle: None,
            }))
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &(EntityId, Entity)> {
            self.entities.iter()
        }

        /// 按类别查询模型空间实体，保持文件中的出现顺序。
        pub fn query(&self, kind: EntityKind) -> impl Iterator<Item = (EntityId, &Entity)> + '_ {
            self.entities
                .iter()
                .filter(move |(_, entity)| entity.kind() == kind)
                .map(|(id, entity)| (*id, entity))
        }

        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            for entity in &definition.entities {
                self.ensure_layer(entity.layer_name());
            }
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find_map(|(entity_id, entity)| (*entity_id == id).then_some(entity))
        }

        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            let mut has = false;
            for (_, entity) in &self.entities {
                if let Some(entity_bounds) = entity.bounds() {
                    bounds.include_bounds(&entity_bounds);
                    has = true;
                }
            }
            if has { Some(bounds) } else { None }
        }

        /// 计算块参照在世界坐标下的范围：块内实体按基点、缩放、旋转、插入点变换后合并。
        /// 块定义缺失时退化为插入点与属性位置。
        pub fn block_reference_bounds(&self, reference: &BlockReference) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            self.include_reference_bounds(reference, &|point: Point2| point, 0, &mut bounds);
            if bounds.is_empty() { None } else { Some(bounds) }
        }

        fn include_reference_bounds(
            &self,
            reference: &BlockReference,
            outer: &dyn Fn(Point2) -> Point2,
            depth: usize,
            bounds: &mut Bounds2D,
        ) {
            // ATTRIB 坐标已是所属层级的插入坐标系
            for attr in &reference.attributes {
                bounds.include_point(outer(attr.insert));
            }
            let Some(definition) = self.block(&reference.name) else {
                bounds.include_point(outer(reference.insert));
                return;
            };
            if depth >= MAX_BLOCK_DEPTH {
                bounds.include_point(outer(reference.insert));
                return;
            }

            let base = definition.base_point;
            let scale = reference.scale;
            let insert = reference.insert;
            let rotation = reference.rotation;
            let local = move |point: Point2| {
                let scaled = Point2::new(
                    (point.x() - base.x()) * scale.x(),
                    (point.y() - base.y()) * scale.y(),
                );
                let rotated = scaled.rotate_about(Point2::new(0.0, 0.0), rotation);
                outer(Point2::new(rotated.x() + insert.x(), rotated.y() + insert.y()))
            };

            for entity in &definition.entities {
                match entity {
                    Entity::BlockReference(nested) => {
                        self.include_reference_bounds(nested, &local, depth + 1, bounds);
                    }
                    other => {
                        if let Some(entity_bounds) = other.bounds() {
                            for corner in entity_bounds.corners() {
                                bounds.include_point(local(corner));
                            }
                        }
                    }
                }
            }
        }

        #[inline]
        fn next_id(&mut self) -> EntityId {
            let id = self.next_entity_id;
            self.next_entity_id += 1;
            EntityId(id)
        }
    }

    fn normalize_angle(angle: f64) -> f64 {
        let mut result = angle % TAU;
        if result < 0.0 {
            result += TAU;
        }
        result
    }

    fn canonical_interval(start: f64, end: f64) -> (f64, f64) {
        let start = normalize_angle(start);
        let mut end = normalize_angle(end);
        if (end - start).abs() < 1e-9 {
            end = start + TAU;
        } else if end < start {
            end += TAU;
        }
        (start, end)
    }

    fn arc_point(center: Point2, radius: f64, angle: f64) -> Point2 {
        let offset = Vector2::new(radius * angle.cos(), radius * angle.sin());
        center.translate(offset)
    }

    fn arc_bounds(arc: &Arc, bounds: &mut Bounds2D) {
        let radius = arc.radius.abs();
        if radius <= f64::EPSILON {
            bounds.include_point(arc.center);
            return;
        }

        let (start, end) = canonical_interval(arc.start_angle, arc.end_angle);
        bounds.include_point(arc_point(arc.center, radius, start));
        bounds.include_point(arc_point(arc.center, radius, end));

        const QUADRANTS: [f64; 4] = [0.0, FRAC_PI_2, PI, FRAC_PI_2 * 3.0];
        for base in QUADRANTS {
            let mut candidate = base;
            while candidate < start {
                candidate += TAU;
            }
            if candidate <= end {
                bounds.include_point(arc_point(arc.center, radius, candidate));
            }
        }
    }

    fn polyline_segment_bounds(start: Point2, end: Point2, bulge: f64, bounds: &mut Bounds2D) {
        if bulge.abs() <= 1e-9 {
            return;
        }

        let start_vec = start.as_vec2();
        let end_vec = end.as_vec2();
        let chord = end_vec - start_vec;
        let chord_len = chord.length();
        if chord_len <= f64::EPSILON {
            return;
        }

        let theta = 4.0 * bulge.atan();
        let sin_half = (theta / 2.0).sin();
        if sin_half.abs() <= 1e-9 {
            return;
        }

        let radius = chord_len / (2.0 * sin_half);
        let midpoint = (start_vec + end_vec) * 0.5;
        let perp_dir = chord.perp().normalize();
        let apothem = radius * (theta / 2.0).cos();
        let center_vec = midpoint + perp_dir * apothem;

        let start_dir = start_vec - center_vec;
        let start_angle = start_dir.y.atan2(start_dir.x);
        let (arc_start, arc_end) = if theta >= 0.0 {
            (start_angle, start_angle + theta)
        } else {
            (start_angle + theta, start_angle)
        };

        let arc = Arc {
            center: Point2::from_vec(center_vec),
            radius: radius.abs(),
            start_angle: arc_start,
            end_angle: arc_end,
            layer: String::new(),
            handle: None,
        };
        arc_bounds(&arc, bounds);
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::f64::consts::FRAC_PI_2;

        fn attribute(text: &str, insert: Point2) -> Attribute {
            Attribute {
                tag: "LINE_NO".to_string(),
                text: text.to_string(),
                insert,
                height: 2.5,
                rotation: 0.0,
                width_factor: 1.0,
                horizontal_align: 0,
                vertical_align: 0,
                alignment: None,
                style: None,
                is_invisible: false,
                layer: "0".to_string(),
                handle: None,
            }
        }

        #[test]
        fn document_stores_entities_in_encounter_order() {
            let mut doc = Document::new();
            let line = doc.add_line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), "BORDER");
            let text = doc.add_text(Point2::new(1.0, 1.0), "-AD-12345678", 2.5, 0.0, "ANNOT");
            let face = doc.add_face3d(
                [
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(10.0, 0.0, 0.0),
                    Point3::new(10.0, 5.0, 0.0),
                    Point3::new(0.0, 5.0, 0.0),
                ],
                [false; 4],
                "FRAME",
            );
            let second_text = doc.add_text(Point2::new(3.0, 1.0), "-A11", 2.5, 0.0, "ANNOT");

            assert_eq!(line.get(), 0);
            assert_eq!(face.get(), 2);
            let texts: Vec<EntityId> = doc.query(EntityKind::Text).map(|(id, _)| id).collect();
            assert_eq!(texts, vec![text, second_text]);
            assert_eq!(doc.query(EntityKind::Face).count(), 1);
            assert_eq!(doc.query(EntityKind::Insert).count(), 0);

            let layers: Vec<_> = doc.layers().map(|l| l.name.clone()).collect();
            assert!(layers.contains(&"0".to_string()));
            assert!(layers.contains(&"ANNOT".to_string()));
            assert!(layers.contains(&"FRAME".to_string()));

            let bounds = doc.bounds().expect("document bounds should exist");
            assert!((bounds.max().x() - 10.0).abs() < 1e-9);
            assert!((bounds.max().y() - 5.0).abs() < 1e-9);
        }

        #[test]
        fn block_reference_bounds_applies_scale_rotation_and_insert() {
            let mut doc = Document::new();
            doc.add_block_definition(BlockDefinition {
                name: "FW TIT".to_string(),
                base_point: Point2::new(0.0, 0.0),
                entities: vec![Entity::Line(Line {
                    start: Point2::new(0.0, 0.0),
                    end: Point2::new(10.0, 5.0),
                    layer: "0".to_string(),
                    handle: None,
                })],
            });
            let reference = BlockReference {
                name: "FW TIT".to_string(),
                insert: Point2::new(100.0, 50.0),
                scale: Vector2::new(2.0, 2.0),
                rotation: FRAC_PI_2,
                attributes: Vec::new(),
                layer: "0".to_string(),
                handle: None,
            };

            let bounds = doc
                .block_reference_bounds(&reference)
                .expect("block bounds should exist");
            // (10,5)*2 = (20,10)，旋转 90° 后为 (-10,20)
            assert!((bounds.min().x() - 90.0).abs() < 1e-9);
            assert!((bounds.min().y() - 50.0).abs() < 1e-9);
            assert!((bounds.max().x() - 100.0).abs() < 1e-9);
            assert!((bounds.max().y() - 70.0).abs() < 1e-9);
        }

        #[test]
        fn block_reference_bounds_without_definition_uses_insert_and_attributes() {
            let doc = Document::new();
            let reference = BlockReference {
                name: "MISSING".to_string(),
                insert: Point2::new(5.0, 5.0),
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
                attributes: vec![attribute("6\"-AD-12345678-A11", Point2::new(8.0, 6.0))],
                layer: "0".to_string(),
                handle: None,
            };
            let bounds = doc.block_reference_bounds(&reference).expect("bounds");
            assert_eq!(bounds.min(), Point2::new(5.0, 5.0));
            assert_eq!(bounds.max(), Point2::new(8.0, 6.0));
        }

        #[test]
        fn nested_block_references_are_expanded() {
            let mut doc = Document::new();
            doc.add_block_definition(BlockDefinition {
                name: "INNER".to_string(),
                base_point: Point2::new(0.0, 0.0),
                entities: vec![Entity::Circle(Circle {
                    center: Point2::new(0.0, 0.0),
                    radius: 1.0,
                    layer: "0".to_string(),
                    handle: None,
                })],
            });
            doc.add_block_definition(BlockDefinition {
                name: "OUTER".to_string(),
                base_point: Point2::new(0.0, 0.0),
                entities: vec![Entity::BlockReference(BlockReference {
                    name: "INNER".to_string(),
                    insert: Point2::new(10.0, 0.0),
                    scale: Vector2::new(1.0, 1.0),
                    rotation: 0.0,
                    attributes: Vec::new(),
                    layer: "0".to_string(),
                    handle: None,
                })],
            });
            let reference = BlockReference {
                name: "OUTER".to_string(),
                insert: Point2::new(0.0, 20.0),
                scale: Vector2::new(1.0, 1.0),
                rotation: 0.0,
                attributes: Vec::new(),
                layer: "0".to_string(),
                handle: None,
            };
            let bounds = doc.block_reference_bounds(&reference).expect("bounds");
            assert!((bounds.min().x() - 9.0).abs() < 1e-9);
            assert!((bounds.max().y() - 21.0).abs() < 1e-9);
        }

        #[test]
        fn bulged_polyline_bounds_include_arc_apex() {
            let polyline = Entity::Polyline(Polyline {
                vertices: vec![
                    PolylineVertex::with_bulge(Point2::new(0.0, 0.0), 1.0),
                    PolylineVertex::new(Point2::new(10.0, 0.0)),
                ],
                is_closed: false,
                layer: "0".to_string(),
                handle: None,
            });
            let bounds = polyline.bounds().expect("bounds");
            // bulge = 1 为半圆，顶点距弦 5 个单位
            assert!((bounds.min().y() + 5.0).abs() < 1e-9 || (bounds.max().y() - 5.0).abs() < 1e-9);
        }
    }
}
