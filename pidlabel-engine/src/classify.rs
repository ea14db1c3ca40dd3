//! 管线标签分类：把文字实体与块属性归入完整标签或各类前缀/后缀片段。

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use pidlabel_config::{ClassifierConfig, PatternKey, RotationKey, SourceKey};
use pidlabel_core::document::{Document, Entity, EntityId, EntityKind};
use pidlabel_core::geometry::Point2;
use pidlabel_core::glyph::TextRun;
use regex::Regex;
use tracing::{debug, warn};

static FULL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\d"-[A-Z]{1,4}-[A-Z\d]{6,8}-[A-Z]"#).expect("完整标签正则"));

static PREFIX_P1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-[A-Z]{1,4}-[0-9]{6,8}$").expect("P1 前缀正则"));
static SUFFIX_P1: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-[A-Z][0-9]").expect("P1 后缀正则"));

static PREFIX_P2: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"-[A-Z]{1,4}-[0-9]{6,8}-$|"-[A-Z]{1,4}-$"#).expect("P2 前缀正则")
});
static SUFFIX_P2: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][0-9]|^[0-9]{6,8}-[A-Z][0-9]").expect("P2 后缀正则"));

static PREFIX_P3: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"-[A-Z]{1,4}-$|"-[A-Z]{1,4}$"#).expect("P3 前缀正则"));
static SUFFIX_P3: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]{6,8}-[A-Z][0-9]").expect("P3 后缀正则"));

static TRAILING_NOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}.*$").expect("尾注正则"));

/// 拆分标签的三种断开位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartialPattern {
    P1,
    P2,
    P3,
}

impl PartialPattern {
    pub const ALL: [PartialPattern; 3] = [PartialPattern::P1, PartialPattern::P2, PartialPattern::P3];

    fn prefix_rule(self) -> &'static Regex {
        match self {
            PartialPattern::P1 => &PREFIX_P1,
            PartialPattern::P2 => &PREFIX_P2,
            PartialPattern::P3 => &PREFIX_P3,
        }
    }

    fn suffix_rule(self) -> &'static Regex {
        match self {
            PartialPattern::P1 => &SUFFIX_P1,
            PartialPattern::P2 => &SUFFIX_P2,
            PartialPattern::P3 => &SUFFIX_P3,
        }
    }

    pub fn key(self) -> PatternKey {
        match self {
            PartialPattern::P1 => PatternKey::P1,
            PartialPattern::P2 => PatternKey::P2,
            PartialPattern::P3 => PatternKey::P3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternTag {
    Full,
    Prefix(PartialPattern),
    Suffix(PartialPattern),
}

impl PatternTag {
    pub const ALL: [PatternTag; 7] = [
        PatternTag::Full,
        PatternTag::Prefix(PartialPattern::P1),
        PatternTag::Suffix(PartialPattern::P1),
        PatternTag::Prefix(PartialPattern::P2),
        PatternTag::Suffix(PartialPattern::P2),
        PatternTag::Prefix(PartialPattern::P3),
        PatternTag::Suffix(PartialPattern::P3),
    ];

    /// 输出表 `Type` 列使用的短码。
    pub fn code(self) -> &'static str {
        match self {
            PatternTag::Full => "F",
            PatternTag::Prefix(PartialPattern::P1) => "P1",
            PatternTag::Prefix(PartialPattern::P2) => "P2",
            PatternTag::Prefix(PartialPattern::P3) => "P3",
            PatternTag::Suffix(PartialPattern::P1) => "S1",
            PatternTag::Suffix(PartialPattern::P2) => "S2",
            PatternTag::Suffix(PartialPattern::P3) => "S3",
        }
    }

    pub fn key(self) -> PatternKey {
        match self {
            PatternTag::Full => PatternKey::F,
            PatternTag::Prefix(pattern) | PatternTag::Suffix(pattern) => pattern.key(),
        }
    }
}

impl fmt::Display for PatternTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 名义方向，用于排序、外框修正与修正表查找。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn key(self) -> RotationKey {
        match self {
            Orientation::Horizontal => RotationKey::Horizontal,
            Orientation::Vertical => RotationKey::Vertical,
        }
    }

    #[inline]
    pub fn degrees(self) -> f64 {
        match self {
            Orientation::Horizontal => 0.0,
            Orientation::Vertical => 90.0,
        }
    }
}

/// 吸附后的旋转类别；不在容差内的角度保留原值并标记人工复核。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationClass {
    Horizontal,
    Vertical,
    Ambiguous(f64),
}

impl RotationClass {
    /// 先规范到 (-180, 180]，再按容差吸附到 0° 或 90°。
    pub fn snap(degrees: f64, tolerance: f64) -> Self {
        let angle = normalize_degrees(degrees);
        if angle.abs() <= tolerance {
            RotationClass::Horizontal
        } else if (angle - 90.0).abs() <= tolerance {
            RotationClass::Vertical
        } else {
            RotationClass::Ambiguous(angle)
        }
    }

    /// 歧义角按文字基线方向（模 180°）归入最近的名义方向。
    pub fn orientation(self) -> Orientation {
        match self {
            RotationClass::Horizontal => Orientation::Horizontal,
            RotationClass::Vertical => Orientation::Vertical,
            RotationClass::Ambiguous(angle) => {
                let folded = angle.rem_euclid(180.0);
                let to_horizontal = folded.min(180.0 - folded);
                let to_vertical = (folded - 90.0).abs();
                if to_vertical < to_horizontal {
                    Orientation::Vertical
                } else {
                    Orientation::Horizontal
                }
            }
        }
    }

    /// 输出用的角度：吸附成功为 0/90，歧义时为规范化后的原角度。
    pub fn degrees(self) -> f64 {
        match self {
            RotationClass::Horizontal => 0.0,
            RotationClass::Vertical => 90.0,
            RotationClass::Ambiguous(angle) => angle,
        }
    }

    #[inline]
    pub fn is_ambiguous(self) -> bool {
        matches!(self, RotationClass::Ambiguous(_))
    }
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let mut angle = degrees % 360.0;
    if angle <= -180.0 {
        angle += 360.0;
    } else if angle > 180.0 {
        angle -= 360.0;
    }
    angle
}

/// 标签来源：独立文字或管线块上的属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelSource {
    Text,
    Insert,
}

impl LabelSource {
    pub fn code(self) -> &'static str {
        match self {
            LabelSource::Text => "T",
            LabelSource::Insert => "I",
        }
    }

    pub fn key(self) -> SourceKey {
        match self {
            LabelSource::Text => SourceKey::Text,
            LabelSource::Insert => SourceKey::Insert,
        }
    }
}

/// 计算外框所需的文字排版数据（与 DXF TEXT/ATTRIB 一致，旋转为弧度）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextGeometry {
    pub insert: Point2,
    pub alignment: Option<Point2>,
    pub height: f64,
    pub width_factor: f64,
    pub rotation: f64,
    pub horizontal_align: i16,
    pub vertical_align: i16,
}

impl TextGeometry {
    fn from_run(run: &TextRun<'_>) -> Self {
        Self {
            insert: run.insert,
            alignment: run.alignment,
            height: run.height,
            width_factor: run.width_factor,
            rotation: run.rotation,
            horizontal_align: run.horizontal_align,
            vertical_align: run.vertical_align,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelCandidate {
    pub entity: EntityId,
    pub handle: Option<String>,
    /// 块属性在所属块参照中的序号，文字实体为 `None`。
    pub attribute_index: Option<usize>,
    pub raw_text: String,
    pub text: String,
    pub raw_rotation: f64,
    pub rotation: RotationClass,
    pub tag: PatternTag,
    pub source: LabelSource,
    /// 排序与输出用的位置：文字取插入点，块属性取块参照插入点。
    pub position: Point2,
    pub geometry: TextGeometry,
}

impl LabelCandidate {
    pub fn run(&self) -> TextRun<'_> {
        TextRun {
            content: &self.raw_text,
            insert: self.geometry.insert,
            alignment: self.geometry.alignment,
            height: self.geometry.height,
            width_factor: self.geometry.width_factor,
            rotation: self.geometry.rotation,
            horizontal_align: self.geometry.horizontal_align,
            vertical_align: self.geometry.vertical_align,
        }
    }

    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.rotation.orientation()
    }

    fn retagged(&self, tag: PatternTag) -> Self {
        Self {
            tag,
            ..self.clone()
        }
    }
}

/// 分类结果：每个标签类别一组候选，组可以为空，组内保持文档顺序。
#[derive(Debug, Clone, Default)]
pub struct Classification {
    groups: BTreeMap<PatternTag, Vec<LabelCandidate>>,
}

impl Classification {
    fn empty() -> Self {
        let groups = PatternTag::ALL
            .into_iter()
            .map(|tag| (tag, Vec::new()))
            .collect();
        Self { groups }
    }

    fn push(&mut self, candidate: LabelCandidate) {
        self.groups.entry(candidate.tag).or_default().push(candidate);
    }

    pub fn group(&self, tag: PatternTag) -> &[LabelCandidate] {
        self.groups.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 指定来源的完整标签。
    pub fn full(&self, source: LabelSource) -> impl Iterator<Item = &LabelCandidate> {
        self.group(PatternTag::Full)
            .iter()
            .filter(move |candidate| candidate.source == source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PatternTag, &[LabelCandidate])> {
        self.groups.iter().map(|(tag, group)| (*tag, group.as_slice()))
    }

    pub fn count(&self, tag: PatternTag) -> usize {
        self.group(tag).len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }

    pub fn ambiguous_count(&self) -> usize {
        self.groups
            .values()
            .flatten()
            .filter(|candidate| candidate.rotation.is_ambiguous())
            .count()
    }
}

/// 文本清洗：去掉首个冒号及之前的内容，截断两个以上连续空白之后的尾注，再去掉尾部空白。
pub fn cleanse_name(raw: &str) -> String {
    let body = match raw.split_once(':') {
        Some((_, rest)) => rest,
        None => raw,
    };
    TRAILING_NOTE.replace(body, "").trim_end().to_string()
}

#[inline]
pub fn is_full_label(text: &str) -> bool {
    FULL.is_match(text)
}

/// 返回文字匹配的全部片段类别（完整标签优先且互斥）。
pub fn match_tags(text: &str) -> Vec<PatternTag> {
    if is_full_label(text) {
        return vec![PatternTag::Full];
    }
    let mut tags = Vec::new();
    for pattern in PartialPattern::ALL {
        if pattern.prefix_rule().is_match(text) {
            tags.push(PatternTag::Prefix(pattern));
        }
        if pattern.suffix_rule().is_match(text) {
            tags.push(PatternTag::Suffix(pattern));
        }
    }
    tags
}

pub fn classify(document: &Document, config: &ClassifierConfig) -> Classification {
    let mut classification = Classification::empty();

    for (id, entity) in document.query(EntityKind::Insert) {
        let Entity::BlockReference(reference) = entity else {
            continue;
        };
        if !config
            .insert_prefixes
            .iter()
            .any(|prefix| reference.name.starts_with(prefix.as_str()))
        {
            continue;
        }
        let raw_rotation = reference.rotation_degrees();
        let rotation = RotationClass::snap(raw_rotation, config.rotation_tolerance);
        for (index, attribute) in reference.attributes.iter().enumerate() {
            if attribute.text.trim().is_empty() {
                continue;
            }
            if config.require_full_for_inserts && !is_full_label(&attribute.text) {
                debug!(block = %reference.name, text = %attribute.text, "块属性不符合完整标签格式，忽略");
                continue;
            }
            classification.push(LabelCandidate {
                entity: id,
                handle: attribute.handle.clone().or_else(|| reference.handle.clone()),
                attribute_index: Some(index),
                raw_text: attribute.text.clone(),
                text: cleanse_name(&attribute.text),
                raw_rotation,
                rotation,
                tag: PatternTag::Full,
                source: LabelSource::Insert,
                position: reference.insert,
                geometry: TextGeometry::from_run(&attribute.run()),
            });
        }
    }

    for (id, entity) in document.query(EntityKind::Text) {
        let Entity::Text(text) = entity else {
            continue;
        };
        let tags = match_tags(&text.content);
        let Some(first) = tags.first() else {
            continue;
        };
        let raw_rotation = text.rotation_degrees();
        let candidate = LabelCandidate {
            entity: id,
            handle: text.handle.clone(),
            attribute_index: None,
            raw_text: text.content.clone(),
            text: cleanse_name(&text.content),
            raw_rotation,
            rotation: RotationClass::snap(raw_rotation, config.rotation_tolerance),
            tag: *first,
            source: LabelSource::Text,
            position: text.insert,
            geometry: TextGeometry::from_run(&text.run()),
        };
        for tag in &tags[1..] {
            classification.push(candidate.retagged(*tag));
        }
        classification.push(candidate);
    }

    let ambiguous = classification.ambiguous_count();
    if ambiguous > 0 {
        warn!(count = ambiguous, "存在无法吸附到 0°/90° 的标签旋转角，需人工复核");
    }
    classification
}
