//! 单张图纸的处理流程：读取 → 图框 → 分类 → 重组 → 外框 → 坐标变换。

use std::collections::HashSet;
use std::path::Path;

use pidlabel_config::{AppConfig, ClassifierConfig, ExtentConfig, FrameConfig};
use pidlabel_core::document::Document;
use pidlabel_core::glyph::GlyphMetrics;
use pidlabel_io::{DocumentLoader, DxfFacade};
use tracing::{debug, info, warn};

use crate::classify::{
    Classification, LabelCandidate, LabelSource, PartialPattern, PatternTag, classify,
};
use crate::corrections::{CorrectionKey, CorrectionTable};
use crate::errors::{CorrectionError, PipelineError};
use crate::extent::extract_bbox;
use crate::frame::{Frame, resolve_frame};
use crate::output::LabelRecord;
use crate::reassemble::{ReassembledLabel, reassemble};
use crate::round_to;
use crate::transform::{DrawingBox, RasterTarget, RatioBox, to_ratio};

/// 单张图纸的处理结果与复核信息。
#[derive(Debug, Clone)]
pub struct DrawingReport {
    pub filename: String,
    pub frame: Frame,
    pub records: Vec<LabelRecord>,
    /// 输出的物理标签数（一对前后缀计为一个）。
    pub labels: usize,
    /// 旋转角无法吸附的片段数。
    pub ambiguous: usize,
    /// 未能配对的片段数。
    pub leftovers: usize,
    /// 因贴近图框右缘而丢弃的标签数。
    pub discarded: usize,
    pub correction_version: String,
}

impl DrawingReport {
    #[inline]
    pub fn needs_review(&self) -> bool {
        self.ambiguous > 0 || self.leftovers > 0
    }
}

pub struct DrawingPipeline<L = DxfFacade> {
    loader: L,
    frame: FrameConfig,
    classifier: ClassifierConfig,
    extent: ExtentConfig,
    corrections: CorrectionTable,
    metrics: Box<dyn GlyphMetrics>,
}

impl DrawingPipeline<DxfFacade> {
    pub fn from_config(config: &AppConfig) -> Result<Self, CorrectionError> {
        Self::with_loader(DxfFacade::new(), config)
    }
}

impl<L: DocumentLoader> DrawingPipeline<L> {
    pub fn with_loader(loader: L, config: &AppConfig) -> Result<Self, CorrectionError> {
        Ok(Self {
            loader,
            frame: config.frame.clone(),
            classifier: config.classifier.clone(),
            extent: config.extent.clone(),
            corrections: CorrectionTable::from_config(&config.corrections)?,
            metrics: Box::new(config.extent.glyph),
        })
    }

    /// 替换字形度量实现。
    pub fn with_metrics(mut self, metrics: Box<dyn GlyphMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[inline]
    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    pub fn run(&self, path: &Path, raster: &RasterTarget) -> Result<DrawingReport, PipelineError> {
        let document = self.loader.load(path)?;
        let filename = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.process(&document, &filename, raster)
    }

    /// 处理已加载的文档；输出按 块属性完整标签、文字完整标签、P1、P2、P3 的顺序排列。
    pub fn process(
        &self,
        document: &Document,
        filename: &str,
        raster: &RasterTarget,
    ) -> Result<DrawingReport, PipelineError> {
        let frame = resolve_frame(document, &self.frame)?;
        let classification = classify(document, &self.classifier);
        log_groups(filename, &classification);

        let mut report = DrawingReport {
            filename: filename.to_string(),
            frame,
            records: Vec::new(),
            labels: 0,
            ambiguous: classification.ambiguous_count(),
            leftovers: 0,
            discarded: 0,
            correction_version: self.corrections.version().to_string(),
        };

        for source in [LabelSource::Insert, LabelSource::Text] {
            for candidate in classification.full(source) {
                self.emit(&ReassembledLabel::Single(candidate.clone()), raster, &mut report);
            }
        }

        let mut emitted = HashSet::new();
        for pattern in PartialPattern::ALL {
            let prefixes = classification.group(PatternTag::Prefix(pattern));
            if prefixes.is_empty() {
                debug!(file = filename, pattern = ?pattern, "无前缀片段，跳过该分组");
                continue;
            }
            let reassembly = reassemble(prefixes, classification.group(PatternTag::Suffix(pattern)));
            if reassembly.has_leftovers() {
                warn!(
                    file = filename,
                    pattern = ?pattern,
                    count = reassembly.leftovers.len(),
                    "前后缀片段未能全部配对，需人工复核"
                );
                report.leftovers += reassembly.leftovers.len();
            }
            for label in &reassembly.labels {
                if !emitted.insert(label.sources()) {
                    debug!(file = filename, pattern = ?pattern, "同一组片段已在前序分组输出，跳过");
                    continue;
                }
                self.emit(label, raster, &mut report);
            }
        }

        info!(
            file = filename,
            labels = report.labels,
            rows = report.records.len(),
            discarded = report.discarded,
            review = report.needs_review(),
            "图纸处理完成"
        );
        Ok(report)
    }

    fn emit(&self, label: &ReassembledLabel, raster: &RasterTarget, report: &mut DrawingReport) {
        let fragments: Vec<(&LabelCandidate, DrawingBox, RatioBox)> = label
            .fragments()
            .into_iter()
            .map(|candidate| {
                let drawing = extract_bbox(candidate, self.metrics.as_ref(), &self.extent);
                let ratio = to_ratio(&drawing, &report.frame);
                (candidate, drawing, ratio)
            })
            .collect();

        if let Some((lead, _, ratio)) = fragments.first() {
            if ratio.exceeds_edge(self.frame.edge_threshold) {
                debug!(text = %lead.text, x_ratio = ratio.lower_left().x, "标签贴近图框右缘，丢弃");
                report.discarded += 1;
                return;
            }
        }

        let index = report.labels;
        for (candidate, drawing, ratio) in fragments {
            let corrected = self
                .corrections
                .apply(&CorrectionKey::of(candidate), &ratio);
            let pixels = raster.to_pixels(&corrected, &report.frame);
            report.records.push(LabelRecord {
                text_id: candidate
                    .handle
                    .clone()
                    .unwrap_or_else(|| format!("#{}", candidate.entity.get())),
                text_name: candidate.text.clone(),
                text_x: round_to(candidate.position.x(), 3),
                text_y: round_to(candidate.position.y(), 3),
                text_rotation: candidate.rotation.degrees(),
                pattern: candidate.tag.code().to_string(),
                text_width: round_to(drawing.width(), 3),
                text_height: round_to(drawing.height(), 3),
                lower_left_x: pixels.min().x,
                lower_left_y: pixels.min().y,
                upper_right_x: pixels.max().x,
                upper_right_y: pixels.max().y,
                filename: report.filename.clone(),
                source: candidate.source.code().to_string(),
                label: index,
                review: candidate.rotation.is_ambiguous(),
            });
        }
        report.labels += 1;
    }
}

fn log_groups(filename: &str, classification: &Classification) {
    for (tag, group) in classification.iter() {
        if !group.is_empty() {
            debug!(file = filename, tag = %tag, count = group.len(), "标签分组");
        }
    }
}
