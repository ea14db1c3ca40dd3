use std::convert::TryFrom;
use std::fs;
use std::path::{Path, PathBuf};

use pidlabel_core::{
    document::{
        Arc, Attribute, BlockDefinition, BlockReference, Circle, Document, Entity, Line, Polyline,
        PolylineVertex, Text, ThreeDFace,
    },
    geometry::{Point2, Point3, Vector2},
};
use thiserror::Error;
use tracing::debug;

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

#[derive(Debug, Error)]
pub enum IoError {
    #[error("读取文件 {path:?} 失败: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("无效的文档结构: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// DXF 读取入口，只解析 BLOCKS 与 ENTITIES 两个段。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的 DXF 字节流；非 UTF-8 内容（ANSI 代码页）按有损方式解码。
    pub fn parse_bytes(&self, data: &[u8]) -> Result<Document, IoError> {
        if data.starts_with(BINARY_SENTINEL) {
            return Err(IoError::InvalidDocument("不支持二进制 DXF".to_string()));
        }
        let text = String::from_utf8_lossy(data);
        let source = text.strip_prefix('\u{feff}').unwrap_or(&text);
        DxfParser::new(source)
            .parse()
            .map_err(|err| match err {
                DxfError::Invalid { message } => IoError::InvalidDocument(message),
            })
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_bytes(&data)
    }
}

#[derive(Debug)]
enum DxfError {
    Invalid { message: String },
}

impl DxfError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();
        while let Some((code, value)) = self.reader.next_pair()? {
            // 999 为注释行，可出现在文件任意位置
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.trim() {
                "SECTION" => {
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                kind => {
                    if let Some(entity) = self.parse_entity(kind)? {
                        document.add_entity(entity);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.trim() {
                "ENDSEC" => break,
                "BLOCK" => {
                    if let Some(definition) = self.parse_block_definition()? {
                        document.add_block_definition(definition);
                    }
                }
                _ => {
                    // 未预期的条目（例如嵌套记录），直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<Option<BlockDefinition>, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        let mut collect_entities = true;
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    entity_kind => {
                        if collect_entities {
                            if let Some(entity) = self.parse_entity(entity_kind)? {
                                entities.push(entity);
                            }
                        } else {
                            self.skip_entity_body()?;
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => {
                        let trimmed = value.trim().to_string();
                        // 匿名块（*Model_Space、*D 等）对图框与标注无意义
                        collect_entities = !trimmed.starts_with('*');
                        name = Some(trimmed);
                    }
                    10 => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                    20 => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                    _ => {}
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        if !collect_entities {
            return Ok(None);
        }

        Ok(Some(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        }))
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Option<Entity>, DxfError> {
        let entity = match kind {
            "LINE" => self.parse_line()?,
            "CIRCLE" => self.parse_circle()?,
            "ARC" => self.parse_arc()?,
            "LWPOLYLINE" => self.parse_lwpolyline()?,
            "POLYLINE" => return self.parse_polyline_entity(),
            "TEXT" => self.parse_text()?,
            "INSERT" => self.parse_insert()?,
            "3DFACE" => self.parse_3dface()?,
            other => {
                debug!(kind = other, line = self.reader.line_number, "跳过未处理的实体");
                self.skip_entity_body()?;
                return Ok(None);
            }
        };
        Ok(Some(entity))
    }

    fn parse_line(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut start_x = None;
        let mut start_y = None;
        let mut end_x = None;
        let mut end_y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    10 => assign_coord(&mut start_x, &value, "LINE 起点 X（组码 10）")?,
                    20 => assign_coord(&mut start_y, &value, "LINE 起点 Y（组码 20）")?,
                    11 => assign_coord(&mut end_x, &value, "LINE 终点 X（组码 11）")?,
                    21 => assign_coord(&mut end_y, &value, "LINE 终点 Y（组码 21）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
        let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
        let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
        let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;

        let (layer, handle) = common.finish();
        Ok(Entity::Line(Line {
            start: Point2::new(sx, sy),
            end: Point2::new(ex, ey),
            layer,
            handle,
        }))
    }

    fn parse_circle(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    10 => assign_coord(&mut center_x, &value, "CIRCLE 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "CIRCLE 圆心 Y（组码 20）")?,
                    40 => assign_coord(&mut radius, &value, "CIRCLE 半径（组码 40）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("CIRCLE 未正确结束")),
            }
        }

        let cx = center_x.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("CIRCLE 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("CIRCLE 缺少半径（组码 40）"))?;

        let (layer, handle) = common.finish();
        Ok(Entity::Circle(Circle {
            center: Point2::new(cx, cy),
            radius,
            layer,
            handle,
        }))
    }

    fn parse_arc(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut center_x = None;
        let mut center_y = None;
        let mut radius = None;
        let mut start_angle = None;
        let mut end_angle = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    10 => assign_coord(&mut center_x, &value, "ARC 圆心 X（组码 10）")?,
                    20 => assign_coord(&mut center_y, &value, "ARC 圆心 Y（组码 20）")?,
                    40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                    50 => assign_coord(&mut start_angle, &value, "ARC 起始角（组码 50）")?,
                    51 => assign_coord(&mut end_angle, &value, "ARC 终止角（组码 51）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("ARC 未正确结束")),
            }
        }

        let cx = center_x.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 X（组码 10）"))?;
        let cy = center_y.ok_or_else(|| DxfError::invalid("ARC 缺少圆心 Y（组码 20）"))?;
        let radius = radius.ok_or_else(|| DxfError::invalid("ARC 缺少半径（组码 40）"))?;
        let start_angle =
            start_angle.ok_or_else(|| DxfError::invalid("ARC 缺少起始角（组码 50）"))?;
        let end_angle = end_angle.ok_or_else(|| DxfError::invalid("ARC 缺少终止角（组码 51）"))?;

        let (layer, handle) = common.finish();
        Ok(Entity::Arc(Arc {
            center: Point2::new(cx, cy),
            radius,
            start_angle: start_angle.to_radians(),
            end_angle: end_angle.to_radians(),
            layer,
            handle,
        }))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut is_closed = false;
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut pending_x: Option<f64> = None;
        let mut pending_y: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    70 => {
                        let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                        is_closed = flag & 0x01 == 0x01;
                    }
                    10 => {
                        let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                        if let Some(y) = pending_y.take() {
                            vertices.push(PolylineVertex::new(Point2::new(x, y)));
                        } else if pending_x.replace(x).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 Y（组码 20）",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                        if let Some(x) = pending_x.take() {
                            vertices.push(PolylineVertex::new(Point2::new(x, y)));
                        } else if pending_y.replace(y).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 X（组码 10）",
                            ));
                        }
                    }
                    42 => {
                        let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                        let vertex = vertices.last_mut().ok_or_else(|| {
                            DxfError::invalid("LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）")
                        })?;
                        vertex.bulge = bulge;
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() || pending_y.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }
        if vertices.is_empty() {
            return Err(DxfError::invalid("LWPOLYLINE 未解析到任何顶点"));
        }

        let (layer, handle) = common.finish();
        Ok(Entity::Polyline(Polyline {
            vertices,
            is_closed,
            layer,
            handle,
        }))
    }

    /// 旧式 POLYLINE：仅保留 2D 折线，网格与多面网格整体跳过。
    fn parse_polyline_entity(&mut self) -> Result<Option<Entity>, DxfError> {
        let mut common = CommonFields::default();
        let mut flags: i16 = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    70 => flags = parse_i16(&value, "POLYLINE 标志（组码 70）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("POLYLINE 未正确结束")),
            }
        }

        if flags & (0x10 | 0x40) != 0 {
            debug!(flags, "跳过 POLYLINE 网格");
            self.skip_polyline_sequence()?;
            return Ok(None);
        }

        let mut vertices: Vec<PolylineVertex> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => vertices.push(self.parse_polyline_vertex()?),
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, _)) => {
                    return Err(DxfError::invalid(format!(
                        "POLYLINE 顶点序列出现意外组码 {code}"
                    )));
                }
                None => return Err(DxfError::invalid("POLYLINE 顶点序列未正确结束")),
            }
        }

        if vertices.is_empty() {
            return Err(DxfError::invalid("POLYLINE 未解析到任何顶点"));
        }

        let (layer, handle) = common.finish();
        Ok(Some(Entity::Polyline(Polyline {
            vertices,
            is_closed: flags & 0x01 != 0,
            layer,
            handle,
        })))
    }

    fn parse_polyline_vertex(&mut self) -> Result<PolylineVertex, DxfError> {
        let mut x = None;
        let mut y = None;
        let mut bulge = 0.0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    10 => assign_coord(&mut x, &value, "VERTEX X（组码 10）")?,
                    20 => assign_coord(&mut y, &value, "VERTEX Y（组码 20）")?,
                    42 => bulge = parse_f64(&value, "VERTEX bulge（组码 42）")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("VERTEX 未正确结束")),
            }
        }

        let x = x.ok_or_else(|| DxfError::invalid("VERTEX 缺少 X（组码 10）"))?;
        let y = y.ok_or_else(|| DxfError::invalid("VERTEX 缺少 Y（组码 20）"))?;
        Ok(PolylineVertex::with_bulge(Point2::new(x, y), bulge))
    }

    fn skip_polyline_sequence(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "VERTEX" => self.skip_entity_body()?,
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }

    fn parse_text(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut style = TextFields::default();
        let mut text: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    1 => {
                        if text.is_some() {
                            return Err(DxfError::invalid("TEXT 遇到重复的文本内容（组码 1）"));
                        }
                        text = Some(value);
                    }
                    code => style.accept(code, &value, "TEXT")?,
                },
                None => return Err(DxfError::invalid("TEXT 未正确结束")),
            }
        }

        let content = text.ok_or_else(|| DxfError::invalid("TEXT 缺少文本内容（组码 1）"))?;
        let fields = style.finish("TEXT")?;
        let (layer, handle) = common.finish();

        Ok(Entity::Text(Text {
            insert: fields.insert,
            content,
            height: fields.height,
            rotation: fields.rotation_deg.to_radians(),
            width_factor: fields.width_factor,
            horizontal_align: fields.horizontal_align,
            vertical_align: fields.vertical_align,
            alignment: fields.alignment,
            style: fields.style,
            layer,
            handle,
        }))
    }

    fn parse_insert(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut name = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    2 => {
                        if name.is_some() {
                            return Err(DxfError::invalid("INSERT 遇到重复的块名（组码 2）"));
                        }
                        name = Some(value.trim().to_string());
                    }
                    10 => assign_coord(&mut insert_x, &value, "INSERT 插入点 X（组码 10）")?,
                    20 => assign_coord(&mut insert_y, &value, "INSERT 插入点 Y（组码 20）")?,
                    41 => scale_x = Some(parse_f64(&value, "INSERT 缩放 X")?),
                    42 => scale_y = Some(parse_f64(&value, "INSERT 缩放 Y")?),
                    50 => rotation_deg = parse_f64(&value, "INSERT 旋转角")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("INSERT 未正确结束")),
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("INSERT 缺少块名（组码 2）"))?;
        let ix = insert_x.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 X（组码 10）"))?;
        let iy = insert_y.ok_or_else(|| DxfError::invalid("INSERT 缺少插入点 Y（组码 20）"))?;
        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or_else(|| scale_x.unwrap_or(1.0));

        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ATTRIB" => attributes.push(self.parse_attrib()?),
                    "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    _ => {
                        self.reader.put_back((0, value));
                        break;
                    }
                },
                Some((code, value)) => {
                    return Err(DxfError::invalid(format!(
                        "INSERT 属性段出现意外组码 {code} 值 {value}"
                    )));
                }
                None => break,
            }
        }

        let (layer, handle) = common.finish();
        Ok(Entity::BlockReference(BlockReference {
            name,
            insert: Point2::new(ix, iy),
            scale: Vector2::new(sx, sy),
            rotation: rotation_deg.to_radians(),
            attributes,
            layer,
            handle,
        }))
    }

    fn parse_attrib(&mut self) -> Result<Attribute, DxfError> {
        let mut common = CommonFields::default();
        let mut style = TextFields::default();
        let mut text: Option<String> = None;
        let mut tag: Option<String> = None;
        let mut flags: i16 = 0;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    1 => {
                        if text.is_some() {
                            return Err(DxfError::invalid("ATTRIB 遇到重复的文本内容（组码 1）"));
                        }
                        text = Some(value);
                    }
                    2 => tag = Some(value.trim().to_string()),
                    70 => flags = parse_i16(&value, "ATTRIB 标志")?,
                    // ATTRIB 的垂直对齐使用组码 74
                    74 => style.accept(73, &value, "ATTRIB")?,
                    73 => {}
                    code => style.accept(code, &value, "ATTRIB")?,
                },
                None => return Err(DxfError::invalid("ATTRIB 未正确结束")),
            }
        }

        let text = text.ok_or_else(|| DxfError::invalid("ATTRIB 缺少文本内容（组码 1）"))?;
        let tag = tag.ok_or_else(|| DxfError::invalid("ATTRIB 缺少标记（组码 2）"))?;
        let fields = style.finish("ATTRIB")?;
        let (layer, handle) = common.finish();

        Ok(Attribute {
            tag,
            text: decode_inline_text(&text),
            insert: fields.insert,
            height: fields.height,
            rotation: fields.rotation_deg.to_radians(),
            width_factor: fields.width_factor,
            horizontal_align: fields.horizontal_align,
            vertical_align: fields.vertical_align,
            alignment: fields.alignment,
            style: fields.style,
            is_invisible: flags & 0x01 != 0,
            layer,
            handle,
        })
    }

    fn parse_3dface(&mut self) -> Result<Entity, DxfError> {
        let mut common = CommonFields::default();
        let mut vx = [None; 4];
        let mut vy = [None; 4];
        let mut vz = [None; 4];
        let mut invisible_edges: Option<i16> = None;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    5 | 8 => common.accept(code, &value),
                    10 => assign_coord(&mut vx[0], &value, "3DFACE 顶点 1 X（组码 10）")?,
                    20 => assign_coord(&mut vy[0], &value, "3DFACE 顶点 1 Y（组码 20）")?,
                    30 => assign_coord(&mut vz[0], &value, "3DFACE 顶点 1 Z（组码 30）")?,
                    11 => assign_coord(&mut vx[1], &value, "3DFACE 顶点 2 X（组码 11）")?,
                    21 => assign_coord(&mut vy[1], &value, "3DFACE 顶点 2 Y（组码 21）")?,
                    31 => assign_coord(&mut vz[1], &value, "3DFACE 顶点 2 Z（组码 31）")?,
                    12 => assign_coord(&mut vx[2], &value, "3DFACE 顶点 3 X（组码 12）")?,
                    22 => assign_coord(&mut vy[2], &value, "3DFACE 顶点 3 Y（组码 22）")?,
                    32 => assign_coord(&mut vz[2], &value, "3DFACE 顶点 3 Z（组码 32）")?,
                    13 => assign_coord(&mut vx[3], &value, "3DFACE 顶点 4 X（组码 13）")?,
                    23 => assign_coord(&mut vy[3], &value, "3DFACE 顶点 4 Y（组码 23）")?,
                    33 => assign_coord(&mut vz[3], &value, "3DFACE 顶点 4 Z（组码 33）")?,
                    70 => {
                        if invisible_edges.is_some() {
                            return Err(DxfError::invalid(
                                "3DFACE 遇到重复的隐藏边标记（组码 70）",
                            ));
                        }
                        invisible_edges = Some(parse_i16(&value, "3DFACE 隐藏边标记（组码 70）")?);
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("3DFACE 未正确结束")),
            }
        }

        let v1 = build_face_vertex(1, vx[0], vy[0], vz[0])?
            .ok_or_else(|| DxfError::invalid("3DFACE 缺少第 1 个顶点"))?;
        let v2 = build_face_vertex(2, vx[1], vy[1], vz[1])?
            .ok_or_else(|| DxfError::invalid("3DFACE 缺少第 2 个顶点"))?;
        let v3 = build_face_vertex(3, vx[2], vy[2], vz[2])?
            .ok_or_else(|| DxfError::invalid("3DFACE 缺少第 3 个顶点"))?;
        let v4 = build_face_vertex(4, vx[3], vy[3], vz[3])?.unwrap_or(v3);

        let flags = invisible_edges.unwrap_or(0);
        let invisible = [
            flags & 1 != 0,
            flags & 2 != 0,
            flags & 4 != 0,
            flags & 8 != 0,
        ];

        let (layer, handle) = common.finish();
        Ok(Entity::Face3D(ThreeDFace {
            layer,
            vertices: [v1, v2, v3, v4],
            invisible_edges: invisible,
            handle,
        }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

/// 所有实体共有的句柄（组码 5）与图层（组码 8）。
#[derive(Default)]
struct CommonFields {
    layer: Option<String>,
    handle: Option<String>,
}

impl CommonFields {
    fn accept(&mut self, code: i32, value: &str) {
        let trimmed = value.trim();
        match code {
            5 if !trimmed.is_empty() => self.handle = Some(trimmed.to_string()),
            8 => self.layer = Some(trimmed.to_string()),
            _ => {}
        }
    }

    fn finish(self) -> (String, Option<String>) {
        (self.layer.unwrap_or_else(|| "0".to_string()), self.handle)
    }
}

/// TEXT 与 ATTRIB 共用的排版字段。
#[derive(Default)]
struct TextFields {
    insert_x: Option<f64>,
    insert_y: Option<f64>,
    align_x: Option<f64>,
    align_y: Option<f64>,
    height: Option<f64>,
    rotation_deg: Option<f64>,
    width_factor: Option<f64>,
    horizontal_align: Option<i16>,
    vertical_align: Option<i16>,
    style: Option<String>,
}

struct ResolvedTextFields {
    insert: Point2,
    alignment: Option<Point2>,
    height: f64,
    rotation_deg: f64,
    width_factor: f64,
    horizontal_align: i16,
    vertical_align: i16,
    style: Option<String>,
}

impl TextFields {
    fn accept(&mut self, code: i32, value: &str, kind: &str) -> Result<(), DxfError> {
        match code {
            10 => assign_coord(&mut self.insert_x, value, &format!("{kind} 插入点 X（组码 10）")),
            20 => assign_coord(&mut self.insert_y, value, &format!("{kind} 插入点 Y（组码 20）")),
            11 => assign_coord(&mut self.align_x, value, &format!("{kind} 对齐点 X（组码 11）")),
            21 => assign_coord(&mut self.align_y, value, &format!("{kind} 对齐点 Y（组码 21）")),
            40 => assign_coord(&mut self.height, value, &format!("{kind} 文字高度（组码 40）")),
            41 => {
                self.width_factor = Some(parse_f64(value, &format!("{kind} 宽度因子"))?);
                Ok(())
            }
            50 => {
                self.rotation_deg = Some(parse_f64(value, &format!("{kind} 旋转角"))?);
                Ok(())
            }
            72 => {
                self.horizontal_align = Some(parse_i16(value, &format!("{kind} 水平对齐"))?);
                Ok(())
            }
            73 => {
                self.vertical_align = Some(parse_i16(value, &format!("{kind} 垂直对齐"))?);
                Ok(())
            }
            7 => {
                self.style = Some(value.trim().to_string());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn finish(self, kind: &str) -> Result<ResolvedTextFields, DxfError> {
        let ix = self
            .insert_x
            .ok_or_else(|| DxfError::invalid(format!("{kind} 缺少插入点 X（组码 10）")))?;
        let iy = self
            .insert_y
            .ok_or_else(|| DxfError::invalid(format!("{kind} 缺少插入点 Y（组码 20）")))?;
        let height = self
            .height
            .ok_or_else(|| DxfError::invalid(format!("{kind} 缺少文字高度（组码 40）")))?;
        let alignment = match (self.align_x, self.align_y) {
            (Some(x), Some(y)) => Some(Point2::new(x, y)),
            _ => None,
        };
        Ok(ResolvedTextFields {
            insert: Point2::new(ix, iy),
            alignment,
            height,
            rotation_deg: self.rotation_deg.unwrap_or(0.0),
            width_factor: self.width_factor.unwrap_or(1.0),
            horizontal_align: self.horizontal_align.unwrap_or(0),
            vertical_align: self.vertical_align.unwrap_or(0),
            style: self.style,
        })
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 容忍文件末尾的空行
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn build_face_vertex(
    index: usize,
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
) -> Result<Option<Point3>, DxfError> {
    match (x, y, z) {
        (None, None, None) => Ok(None),
        (Some(x), Some(y), z) => Ok(Some(Point3::new(x, y, z.unwrap_or(0.0)))),
        _ => Err(DxfError::invalid(format!(
            "3DFACE 顶点 {index} 缺少完整的 XY 坐标"
        ))),
    }
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i16(raw: &str, context: &str) -> Result<i16, DxfError> {
    let value = parse_i32(raw, context)?;
    i16::try_from(value)
        .map_err(|_| DxfError::invalid(format!("{context} 超出 i16 范围（值：{value}）")))
}

fn decode_inline_text(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('P') | Some('p') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}
