use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pidlabel_core::glyph::StrokeFontMetrics;
use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "PIDLABEL_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub extent: ExtentConfig,
    #[serde(default)]
    pub raster: RasterConfig,
    #[serde(default)]
    pub corrections: CorrectionsConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 自动发现配置文件：优先读取环境变量 `PIDLABEL_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 图框识别参数。
#[derive(Debug, Clone, Deserialize)]
pub struct FrameConfig {
    /// 被视为图签的块名，整块范围即图框。
    #[serde(default = "FrameConfig::default_title_blocks")]
    pub title_blocks: Vec<String>,
    #[serde(default = "FrameConfig::default_decimals")]
    pub decimals: u32,
    /// 左下角 X 比例超过该值的标签视为图框边缘的图签文字，整体丢弃。
    #[serde(default = "FrameConfig::default_edge_threshold")]
    pub edge_threshold: f64,
}

impl FrameConfig {
    fn default_title_blocks() -> Vec<String> {
        [
            "CCP_A1_Template FOR PID-20180103",
            "CCP_A1_Template FOR PID",
            "CCP_A1_Template FOR PID-REV.0",
            "CCP_A1_Template FOR UDD",
            "FW TIT",
            "Title Block-UHV-01",
            "gtdf",
            "A$C46B42D60",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    fn default_decimals() -> u32 {
        4
    }

    fn default_edge_threshold() -> f64 {
        0.84
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            title_blocks: Self::default_title_blocks(),
            decimals: Self::default_decimals(),
            edge_threshold: Self::default_edge_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// 管线标签块名前缀。
    #[serde(default = "ClassifierConfig::default_insert_prefixes")]
    pub insert_prefixes: Vec<String>,
    /// 旋转角吸附到 0°/90° 的容差（度）。
    #[serde(default = "ClassifierConfig::default_rotation_tolerance")]
    pub rotation_tolerance: f64,
    #[serde(default = "ClassifierConfig::default_require_full_for_inserts")]
    pub require_full_for_inserts: bool,
}

impl ClassifierConfig {
    fn default_insert_prefixes() -> Vec<String> {
        vec!["Pipeline".to_string(), "LINE NO".to_string()]
    }

    fn default_rotation_tolerance() -> f64 {
        5.0
    }

    fn default_require_full_for_inserts() -> bool {
        true
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            insert_prefixes: Self::default_insert_prefixes(),
            rotation_tolerance: Self::default_rotation_tolerance(),
            require_full_for_inserts: Self::default_require_full_for_inserts(),
        }
    }
}

/// 外框尺寸修正参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ExtentConfig {
    #[serde(default)]
    pub insert: InsertExtentConfig,
    #[serde(default = "TextPaddingConfig::horizontal")]
    pub text_horizontal: TextPaddingConfig,
    #[serde(default = "TextPaddingConfig::vertical")]
    pub text_vertical: TextPaddingConfig,
    #[serde(default)]
    pub glyph: StrokeFontMetrics,
}

impl Default for ExtentConfig {
    fn default() -> Self {
        Self {
            insert: InsertExtentConfig::default(),
            text_horizontal: TextPaddingConfig::horizontal(),
            text_vertical: TextPaddingConfig::vertical(),
            glyph: StrokeFontMetrics::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsertExtentConfig {
    #[serde(default = "InsertExtentConfig::default_descale")]
    pub descale_x: f64,
    #[serde(default = "InsertExtentConfig::default_descale")]
    pub descale_y: f64,
    #[serde(default = "InsertExtentConfig::default_horizontal_width_trim")]
    pub horizontal_width_trim: f64,
    #[serde(default = "InsertExtentConfig::default_vertical_height_trim")]
    pub vertical_height_trim: f64,
}

impl InsertExtentConfig {
    fn default_descale() -> f64 {
        0.75
    }

    fn default_horizontal_width_trim() -> f64 {
        3.0
    }

    fn default_vertical_height_trim() -> f64 {
        2.0
    }
}

impl Default for InsertExtentConfig {
    fn default() -> Self {
        Self {
            descale_x: Self::default_descale(),
            descale_y: Self::default_descale(),
            horizontal_width_trim: Self::default_horizontal_width_trim(),
            vertical_height_trim: Self::default_vertical_height_trim(),
        }
    }
}

/// 自由文字的外框放大：`size / divisor + offset`，左下角平移 `shift`。
#[derive(Debug, Clone, Deserialize)]
pub struct TextPaddingConfig {
    pub width_divisor: f64,
    pub height_divisor: f64,
    #[serde(default)]
    pub width_offset: f64,
    #[serde(default)]
    pub height_offset: f64,
    #[serde(default)]
    pub shift_x: f64,
    #[serde(default)]
    pub shift_y: f64,
}

impl TextPaddingConfig {
    pub fn horizontal() -> Self {
        Self {
            width_divisor: 0.8,
            height_divisor: 0.75,
            width_offset: 0.0,
            height_offset: 0.0,
            shift_x: -0.25,
            shift_y: -0.25,
        }
    }

    pub fn vertical() -> Self {
        Self {
            width_divisor: 0.75,
            height_divisor: 0.75,
            width_offset: 0.05,
            height_offset: -1.5,
            shift_x: -0.5,
            shift_y: -0.25,
        }
    }
}

/// 栅格目标参数。
#[derive(Debug, Clone, Deserialize)]
pub struct RasterConfig {
    /// 找不到配对图像且未指定尺寸时使用的像素宽高。
    #[serde(default)]
    pub default_width_px: Option<u32>,
    #[serde(default)]
    pub default_height_px: Option<u32>,
    /// 绘图坐标下的坐标轴范围 `[x1, x2, y1, y2]`，缺省时取图框。
    #[serde(default)]
    pub axes: Option<[f64; 4]>,
    #[serde(default = "RasterConfig::default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl RasterConfig {
    fn default_image_extensions() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
    }

    /// 两个缺省尺寸都给出时返回 `(宽, 高)`。
    pub fn default_size(&self) -> Option<(u32, u32)> {
        match (self.default_width_px, self.default_height_px) {
            (Some(width), Some(height)) => Some((width, height)),
            _ => None,
        }
    }
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            default_width_px: None,
            default_height_px: None,
            axes: None,
            image_extensions: Self::default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKey {
    Text,
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum PatternKey {
    #[serde(alias = "full")]
    F,
    #[serde(alias = "p1")]
    P1,
    #[serde(alias = "p2")]
    P2,
    #[serde(alias = "p3")]
    P3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationKey {
    Horizontal,
    Vertical,
}

/// 比例坐标修正时的舍入方式，精度固定为 3 位小数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    #[default]
    Nearest,
    Up,
    Down,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct AxisRuleConfig {
    #[serde(default)]
    pub rounding: RoundingMode,
    #[serde(default)]
    pub offset: f64,
}

/// 覆盖修正表中的一项。
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionOverride {
    pub source: SourceKey,
    pub pattern: PatternKey,
    pub rotation: RotationKey,
    #[serde(default)]
    pub lower_left_x: AxisRuleConfig,
    #[serde(default)]
    pub lower_left_y: AxisRuleConfig,
    #[serde(default)]
    pub upper_right_x: AxisRuleConfig,
    #[serde(default)]
    pub upper_right_y: AxisRuleConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorrectionsConfig {
    /// 非空时记录到输出日志，便于追溯所用修正表。
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub overrides: Vec<CorrectionOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchConfig {
    /// 并行工作线程数，缺省由线程池自行决定。
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default)]
    pub icdar: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
