//! 批处理：遍历输入目录、配对栅格图像、并行处理并写出镜像目录结构的 CSV。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use pidlabel_config::AppConfig;
use pidlabel_engine::output::{write_icdar_to_path, write_labels_to_path};
use pidlabel_engine::pipeline::{DrawingPipeline, DrawingReport};
use pidlabel_engine::transform::{AxesLimits, RasterTarget};
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct BatchOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub raster: RasterLookup,
    pub jobs: Option<usize>,
    pub icdar: bool,
}

/// 栅格尺寸来源：优先读取配对图像，其次使用固定尺寸。
pub struct RasterLookup {
    pub directory: Option<PathBuf>,
    pub fallback: Option<(u32, u32)>,
    pub extensions: Vec<String>,
    pub axes: Option<[f64; 4]>,
}

impl RasterLookup {
    fn target_for(&self, relative: &Path) -> Result<RasterTarget> {
        let (width, height) = match self.paired_image(relative) {
            Some(image) => image::image_dimensions(&image)
                .with_context(|| format!("无法读取栅格图像 {}", image.display()))?,
            None => self
                .fallback
                .ok_or_else(|| anyhow!("未找到配对的栅格图像，且未指定 --image-size"))?,
        };
        let target = RasterTarget::new(width, height)?;
        Ok(match self.axes {
            Some(axes) => target.with_axes(AxesLimits::from_array(axes)),
            None => target,
        })
    }

    fn paired_image(&self, relative: &Path) -> Option<PathBuf> {
        let directory = self.directory.as_ref()?;
        self.extensions.iter().find_map(|extension| {
            let candidate = directory.join(relative).with_extension(extension);
            candidate.is_file().then_some(candidate)
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub flagged: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed + self.skipped
    }
}

/// 递归查找 `.dxf`（不区分大小写），按路径排序。
pub fn discover_drawings(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("输入目录不存在或不可读: {}", root.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("遍历输入目录 {} 失败", root.display()))?;
        let is_dxf = entry
            .path()
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("dxf"));
        if entry.file_type().is_file() && is_dxf {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// 输出路径与输入的相对路径一致，扩展名替换为 `extension`。
pub fn mirrored_path(relative: &Path, output_root: &Path, extension: &str) -> PathBuf {
    output_root.join(relative).with_extension(extension)
}

/// 一张待处理图纸及其输出文件。
struct Job {
    path: PathBuf,
    relative: PathBuf,
    table: PathBuf,
    icdar: Option<PathBuf>,
    /// 与先登记图纸冲突的输出文件及其占用者。
    conflict: Option<(PathBuf, PathBuf)>,
}

/// 按遍历顺序登记输出路径；输出文件已被前面的图纸占用时，该图纸不处理。
fn plan_jobs(files: Vec<PathBuf>, options: &BatchOptions) -> Vec<Job> {
    let mut owners: HashMap<PathBuf, PathBuf> = HashMap::new();
    files
        .into_iter()
        .map(|path| {
            let relative = path
                .strip_prefix(&options.input)
                .unwrap_or(path.as_path())
                .to_path_buf();
            let table = mirrored_path(&relative, &options.output, "csv");
            let icdar = options
                .icdar
                .then(|| mirrored_path(&relative, &options.output, "icdar.csv"));
            let outputs = || std::iter::once(&table).chain(icdar.iter());
            let conflict = outputs().find_map(|output| {
                owners
                    .get(output)
                    .map(|owner| (output.clone(), owner.clone()))
            });
            if conflict.is_none() {
                for output in outputs() {
                    owners.insert(output.clone(), relative.clone());
                }
            }
            Job {
                path,
                relative,
                table,
                icdar,
                conflict,
            }
        })
        .collect()
}

pub fn run(options: &BatchOptions, config: &AppConfig) -> Result<BatchSummary> {
    let jobs = plan_jobs(discover_drawings(&options.input)?, options);
    let pipeline = DrawingPipeline::from_config(config).context("修正表配置无效")?;
    debug!(
        count = jobs.len(),
        corrections = pipeline.corrections().version(),
        "待处理图纸"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.unwrap_or(0))
        .build()
        .context("无法创建工作线程池")?;

    let outcomes: Vec<(&Path, Result<DrawingReport>)> = pool.install(|| {
        jobs.par_iter()
            .map(|job| (job.relative.as_path(), process_one(&pipeline, options, job)))
            .collect()
    });

    let mut summary = BatchSummary::default();
    for (relative, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                summary.processed += 1;
                let review = if report.needs_review() {
                    summary.flagged += 1;
                    "，需复核"
                } else {
                    ""
                };
                println!(
                    "[完成] {}: {} 个标签，{} 行{}",
                    relative.display(),
                    report.labels,
                    report.records.len(),
                    review
                );
            }
            Err(err) => {
                summary.skipped += 1;
                warn!(path = %relative.display(), error = %err, "图纸处理失败，已跳过");
                println!("[跳过] {}: {err:#}", relative.display());
            }
        }
    }
    Ok(summary)
}

fn process_one(pipeline: &DrawingPipeline, options: &BatchOptions, job: &Job) -> Result<DrawingReport> {
    if let Some((output, owner)) = &job.conflict {
        bail!(
            "输出文件 {} 已由 {} 使用",
            output.display(),
            owner.display()
        );
    }
    let raster = options.raster.target_for(&job.relative)?;
    let report = pipeline.run(&job.path, &raster)?;
    write_labels_to_path(&job.table, &report.records)?;
    if let Some(icdar) = &job.icdar {
        write_icdar_to_path(icdar, &report.records)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovery_is_sorted_and_case_insensitive() {
        let dir = tempfile::tempdir().expect("临时目录");
        let root = dir.path();
        fs::create_dir_all(root.join("b")).expect("建目录");
        fs::create_dir_all(root.join("a")).expect("建目录");
        fs::write(root.join("b").join("two.DXF"), "").expect("写文件");
        fs::write(root.join("a").join("one.dxf"), "").expect("写文件");
        fs::write(root.join("a").join("notes.txt"), "").expect("写文件");

        let files = discover_drawings(root).expect("遍历失败");
        let relative: Vec<PathBuf> = files
            .iter()
            .map(|path| path.strip_prefix(root).expect("应位于根目录下").to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![Path::new("a").join("one.dxf"), Path::new("b").join("two.DXF")]
        );
    }

    #[test]
    fn missing_input_root_is_an_error() {
        let dir = tempfile::tempdir().expect("临时目录");
        assert!(discover_drawings(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn mirrored_path_keeps_relative_layout() {
        let path = mirrored_path(Path::new("area1/sheet-01.dxf"), Path::new("/out"), "csv");
        assert_eq!(path, Path::new("/out/area1/sheet-01.csv"));
        let icdar = mirrored_path(Path::new("sheet.dxf"), Path::new("/out"), "icdar.csv");
        assert_eq!(icdar, Path::new("/out/sheet.icdar.csv"));
    }

    fn options(root: &Path, icdar: bool) -> BatchOptions {
        BatchOptions {
            input: root.join("in"),
            output: root.join("out"),
            raster: RasterLookup {
                directory: None,
                fallback: Some((100, 100)),
                extensions: Vec::new(),
                axes: None,
            },
            jobs: Some(2),
            icdar,
        }
    }

    #[test]
    fn icdar_output_name_cannot_be_claimed_twice() {
        let root = Path::new("/data");
        let options = options(root, true);
        let files = vec![
            root.join("in").join("a.dxf"),
            root.join("in").join("a.icdar.dxf"),
        ];
        let jobs = plan_jobs(files, &options);
        assert!(jobs[0].conflict.is_none());
        assert_eq!(jobs[0].table, root.join("out").join("a.csv"));
        assert_eq!(jobs[0].icdar, Some(root.join("out").join("a.icdar.csv")));
        let (output, owner) = jobs[1].conflict.clone().expect("应检测到输出冲突");
        assert_eq!(output, root.join("out").join("a.icdar.csv"));
        assert_eq!(owner, Path::new("a.dxf"));
    }

    #[test]
    fn extension_case_variants_share_one_output() {
        let dir = tempfile::tempdir().expect("临时目录");
        let options = options(dir.path(), false);
        fs::create_dir_all(&options.input).expect("建目录");
        let sample = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("data")
            .join("label_sheet.dxf");
        fs::copy(&sample, options.input.join("S.DXF")).expect("复制样例");
        fs::copy(&sample, options.input.join("S.dxf")).expect("复制样例");

        let jobs = plan_jobs(discover_drawings(&options.input).expect("遍历失败"), &options);
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].conflict.is_none());
        assert!(jobs[1].conflict.is_some());

        let summary = run(&options, &AppConfig::default()).expect("批处理应可运行");
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(options.output.join("S.csv").is_file());
    }

    #[test]
    fn raster_lookup_prefers_paired_image() {
        let dir = tempfile::tempdir().expect("临时目录");
        let raster_dir = dir.path().join("png");
        fs::create_dir_all(raster_dir.join("area1")).expect("建目录");
        image::RgbImage::new(64, 48)
            .save(raster_dir.join("area1").join("sheet.png"))
            .expect("写图像");

        let lookup = RasterLookup {
            directory: Some(raster_dir),
            fallback: Some((10, 10)),
            extensions: vec!["png".to_string(), "jpg".to_string()],
            axes: None,
        };
        let target = lookup
            .target_for(Path::new("area1/sheet.dxf"))
            .expect("应找到图像");
        assert_eq!((target.width_px(), target.height_px()), (64, 48));

        let fallback = lookup
            .target_for(Path::new("area2/other.dxf"))
            .expect("应回退到固定尺寸");
        assert_eq!((fallback.width_px(), fallback.height_px()), (10, 10));
    }

    #[test]
    fn raster_lookup_without_source_fails() {
        let lookup = RasterLookup {
            directory: None,
            fallback: None,
            extensions: Vec::new(),
            axes: None,
        };
        assert!(lookup.target_for(Path::new("sheet.dxf")).is_err());
    }
}
