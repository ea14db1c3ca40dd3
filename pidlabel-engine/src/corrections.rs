//! 比例坐标的经验修正表。
//!
//! 每个键（标签来源、标签类别、名义方向）对应外框四个坐标分量的规则：
//! 先按舍入方式保留 3 位小数，再加上固定偏移。内置表来自实测数据，
//! 可由配置文件中的 `[[corrections.overrides]]` 逐项覆盖。

use std::collections::HashMap;

use glam::DVec2;
use pidlabel_config::{
    AxisRuleConfig, CorrectionsConfig, PatternKey, RotationKey, RoundingMode, SourceKey,
};
use tracing::debug;

use crate::classify::LabelCandidate;
use crate::errors::CorrectionError;
use crate::transform::RatioBox;
use crate::{round_down_to, round_to, round_up_to};

pub const BUILTIN_VERSION: &str = "builtin-2021.1";

/// 单个偏移允许的最大绝对值。
pub const MAX_OFFSET: f64 = 0.01;

const DECIMALS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrectionKey {
    pub source: SourceKey,
    pub pattern: PatternKey,
    pub rotation: RotationKey,
}

impl CorrectionKey {
    pub fn new(source: SourceKey, pattern: PatternKey, rotation: RotationKey) -> Self {
        Self {
            source,
            pattern,
            rotation,
        }
    }

    pub fn of(candidate: &LabelCandidate) -> Self {
        Self::new(
            candidate.source.key(),
            candidate.tag.key(),
            candidate.orientation().key(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisRule {
    pub rounding: RoundingMode,
    pub offset: f64,
}

impl AxisRule {
    const fn new(rounding: RoundingMode, offset: f64) -> Self {
        Self { rounding, offset }
    }

    const fn nearest(offset: f64) -> Self {
        Self::new(RoundingMode::Nearest, offset)
    }

    fn apply(self, value: f64) -> f64 {
        let rounded = match self.rounding {
            RoundingMode::Nearest => round_to(value, DECIMALS),
            RoundingMode::Up => round_up_to(value, DECIMALS),
            RoundingMode::Down => round_down_to(value, DECIMALS),
            RoundingMode::None => value,
        };
        rounded + self.offset
    }

    fn from_config(config: AxisRuleConfig) -> Result<Self, CorrectionError> {
        if !config.offset.is_finite() {
            return Err(CorrectionError::NonFiniteOffset);
        }
        if config.offset.abs() > MAX_OFFSET {
            return Err(CorrectionError::OffsetOutOfRange {
                offset: config.offset,
                limit: MAX_OFFSET,
            });
        }
        Ok(Self::new(config.rounding, config.offset))
    }
}

/// 外框四个分量的修正规则，顺序为左下 X、左下 Y、右上 X、右上 Y。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerRules {
    pub lower_left_x: AxisRule,
    pub lower_left_y: AxisRule,
    pub upper_right_x: AxisRule,
    pub upper_right_y: AxisRule,
}

impl CornerRules {
    const fn new(rules: [AxisRule; 4]) -> Self {
        Self {
            lower_left_x: rules[0],
            lower_left_y: rules[1],
            upper_right_x: rules[2],
            upper_right_y: rules[3],
        }
    }

    fn apply(&self, ratio: &RatioBox) -> RatioBox {
        let lower_left = ratio.lower_left();
        let upper_right = ratio.upper_right();
        RatioBox::new(
            DVec2::new(
                self.lower_left_x.apply(lower_left.x),
                self.lower_left_y.apply(lower_left.y),
            ),
            DVec2::new(
                self.upper_right_x.apply(upper_right.x),
                self.upper_right_y.apply(upper_right.y),
            ),
        )
    }
}

#[derive(Debug, Clone)]
pub struct CorrectionTable {
    version: String,
    entries: HashMap<CorrectionKey, CornerRules>,
}

impl Default for CorrectionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CorrectionTable {
    /// 内置修正表。
    pub fn builtin() -> Self {
        use PatternKey::{F, P1, P2, P3};
        use RotationKey::{Horizontal, Vertical};
        use RoundingMode::{Down, Up};
        use SourceKey::{Insert, Text};

        let n = AxisRule::nearest;
        let up = |offset| AxisRule::new(Up, offset);
        let down = |offset| AxisRule::new(Down, offset);

        let mut entries = HashMap::new();
        entries.insert(
            CorrectionKey::new(Insert, F, Horizontal),
            CornerRules::new([n(0.001), n(0.0), n(-0.001), n(0.001)]),
        );
        entries.insert(
            CorrectionKey::new(Insert, F, Vertical),
            CornerRules::new([n(0.0), n(0.001), n(0.0), n(-0.001)]),
        );
        entries.insert(
            CorrectionKey::new(Text, F, Horizontal),
            CornerRules::new([n(-0.002), n(0.0), n(-0.005), n(0.0)]),
        );
        entries.insert(
            CorrectionKey::new(Text, F, Vertical),
            CornerRules::new([n(0.0), n(-0.001), n(0.0), n(-0.01)]),
        );
        for pattern in [P1, P2] {
            entries.insert(
                CorrectionKey::new(Text, pattern, Horizontal),
                CornerRules::new([n(-0.001), n(0.0), n(-0.002), n(0.0)]),
            );
            entries.insert(
                CorrectionKey::new(Text, pattern, Vertical),
                CornerRules::new([n(0.0), n(-0.001), n(0.0), n(-0.002)]),
            );
        }
        entries.insert(
            CorrectionKey::new(Text, P3, Horizontal),
            CornerRules::new([up(-0.002), down(0.0), down(-0.001), up(0.0)]),
        );
        entries.insert(
            CorrectionKey::new(Text, P3, Vertical),
            CornerRules::new([down(0.0), up(-0.001), up(0.0), down(-0.002)]),
        );

        Self {
            version: BUILTIN_VERSION.to_string(),
            entries,
        }
    }

    /// 内置表叠加配置中的覆盖项。
    pub fn from_config(config: &CorrectionsConfig) -> Result<Self, CorrectionError> {
        let mut table = Self::builtin();
        for item in &config.overrides {
            let key = CorrectionKey::new(item.source, item.pattern, item.rotation);
            let rules = CornerRules {
                lower_left_x: AxisRule::from_config(item.lower_left_x)?,
                lower_left_y: AxisRule::from_config(item.lower_left_y)?,
                upper_right_x: AxisRule::from_config(item.upper_right_x)?,
                upper_right_y: AxisRule::from_config(item.upper_right_y)?,
            };
            debug!(?key, "覆盖内置修正项");
            table.entries.insert(key, rules);
        }
        if let Some(version) = &config.version {
            table.version = version.clone();
        } else if !config.overrides.is_empty() {
            table.version = format!("{BUILTIN_VERSION}+local");
        }
        Ok(table)
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 表中没有的键按最近舍入、零偏移处理。
    pub fn rules(&self, key: &CorrectionKey) -> CornerRules {
        self.entries.get(key).copied().unwrap_or_default()
    }

    pub fn apply(&self, key: &CorrectionKey, ratio: &RatioBox) -> RatioBox {
        self.rules(key).apply(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pidlabel_config::CorrectionOverride;

    fn ratio(llx: f64, lly: f64, urx: f64, ury: f64) -> RatioBox {
        RatioBox::new(DVec2::new(llx, lly), DVec2::new(urx, ury))
    }

    fn assert_box(actual: RatioBox, expected: [f64; 4]) {
        let values = [
            actual.lower_left().x,
            actual.lower_left().y,
            actual.upper_right().x,
            actual.upper_right().y,
        ];
        for (value, want) in values.iter().zip(expected) {
            assert!((value - want).abs() < 1e-9, "实际 {values:?}，期望 {expected:?}");
        }
    }

    #[test]
    fn insert_horizontal_rounds_then_offsets() {
        let table = CorrectionTable::builtin();
        let key = CorrectionKey::new(SourceKey::Insert, PatternKey::F, RotationKey::Horizontal);
        let corrected = table.apply(&key, &ratio(0.12345, 0.2006, 0.30049, 0.4));
        assert_box(corrected, [0.124, 0.201, 0.299, 0.401]);
    }

    #[test]
    fn text_full_vertical_shrinks_top_edge() {
        let table = CorrectionTable::builtin();
        let key = CorrectionKey::new(SourceKey::Text, PatternKey::F, RotationKey::Vertical);
        let corrected = table.apply(&key, &ratio(0.5, 0.3, 0.52, 0.4));
        assert_box(corrected, [0.5, 0.299, 0.52, 0.39]);
    }

    #[test]
    fn p2_reuses_p1_constants() {
        let table = CorrectionTable::builtin();
        let p1 = table.rules(&CorrectionKey::new(
            SourceKey::Text,
            PatternKey::P1,
            RotationKey::Horizontal,
        ));
        let p2 = table.rules(&CorrectionKey::new(
            SourceKey::Text,
            PatternKey::P2,
            RotationKey::Horizontal,
        ));
        assert_eq!(p1, p2);
    }

    #[test]
    fn p3_uses_directed_rounding() {
        let table = CorrectionTable::builtin();
        let horizontal = CorrectionKey::new(SourceKey::Text, PatternKey::P3, RotationKey::Horizontal);
        let corrected = table.apply(&horizontal, &ratio(0.1231, 0.2009, 0.3009, 0.4001));
        assert_box(corrected, [0.122, 0.2, 0.299, 0.401]);

        let vertical = CorrectionKey::new(SourceKey::Text, PatternKey::P3, RotationKey::Vertical);
        let corrected = table.apply(&vertical, &ratio(0.1239, 0.2001, 0.3001, 0.4009));
        assert_box(corrected, [0.123, 0.2, 0.301, 0.398]);
    }

    #[test]
    fn unknown_key_only_rounds() {
        let table = CorrectionTable::builtin();
        let key = CorrectionKey::new(SourceKey::Insert, PatternKey::P1, RotationKey::Vertical);
        let corrected = table.apply(&key, &ratio(0.12345, 0.2, 0.3, 0.40051));
        assert_box(corrected, [0.123, 0.2, 0.3, 0.401]);
    }

    #[test]
    fn overrides_replace_entries_and_version() {
        let config = CorrectionsConfig {
            version: Some("site-b".to_string()),
            overrides: vec![CorrectionOverride {
                source: SourceKey::Text,
                pattern: PatternKey::F,
                rotation: RotationKey::Horizontal,
                lower_left_x: AxisRuleConfig {
                    rounding: RoundingMode::None,
                    offset: 0.003,
                },
                lower_left_y: AxisRuleConfig::default(),
                upper_right_x: AxisRuleConfig::default(),
                upper_right_y: AxisRuleConfig::default(),
            }],
        };
        let table = CorrectionTable::from_config(&config).expect("覆盖项应合法");
        assert_eq!(table.version(), "site-b");
        let key = CorrectionKey::new(SourceKey::Text, PatternKey::F, RotationKey::Horizontal);
        let corrected = table.apply(&key, &ratio(0.1, 0.2, 0.3, 0.4));
        assert_box(corrected, [0.103, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn oversized_offset_is_rejected() {
        let config = CorrectionsConfig {
            version: None,
            overrides: vec![CorrectionOverride {
                source: SourceKey::Insert,
                pattern: PatternKey::F,
                rotation: RotationKey::Vertical,
                lower_left_x: AxisRuleConfig::default(),
                lower_left_y: AxisRuleConfig {
                    rounding: RoundingMode::Nearest,
                    offset: 0.05,
                },
                upper_right_x: AxisRuleConfig::default(),
                upper_right_y: AxisRuleConfig::default(),
            }],
        };
        assert!(matches!(
            CorrectionTable::from_config(&config),
            Err(CorrectionError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn builtin_version_is_kept_without_overrides() {
        let table = CorrectionTable::from_config(&CorrectionsConfig::default()).expect("空配置");
        assert_eq!(table.version(), BUILTIN_VERSION);
    }
}
