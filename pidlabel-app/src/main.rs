use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pidlabel_config::{AppConfig, ConfigError};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod batch;
mod inspect;

use batch::{BatchOptions, RasterLookup};

/// 从 P&ID 图纸（DXF）中提取管线标签并输出栅格坐标标注。
#[derive(Parser, Debug)]
#[command(name = "pidlabel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径，缺省时读取 PIDLABEL_CONFIG 或 ./config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 日志过滤表达式，覆盖配置中的等级
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 批量处理目录下的全部 DXF 图纸
    Extract(ExtractArgs),
    /// 打印单张图纸的图框与标签分类统计
    Inspect {
        /// 待检查的 DXF 文件
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// 输入目录（递归查找 .dxf）
    #[arg(long)]
    input: PathBuf,

    /// 输出目录，目录结构与输入一致
    #[arg(long)]
    output: PathBuf,

    /// 与图纸配对的栅格图像目录，相对路径与输入一致
    #[arg(long = "raster-dir", conflicts_with = "image_size")]
    raster_dir: Option<PathBuf>,

    /// 固定栅格尺寸，格式为 宽x高
    #[arg(long = "image-size")]
    image_size: Option<ImageSize>,

    /// 并行工作线程数
    #[arg(long)]
    jobs: Option<usize>,

    /// 额外输出 ICDAR 八坐标格式
    #[arg(long)]
    icdar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImageSize {
    width: u32,
    height: u32,
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (width, height) = value
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("栅格尺寸应为 宽x高，实际为 `{value}`"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .ok()
                .filter(|pixels| *pixels > 0)
                .ok_or_else(|| format!("无效的像素数 `{part}`"))
        };
        Ok(Self {
            width: parse(width)?,
            height: parse(height)?,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, config_warning) = load_configuration(cli.config.as_ref());
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level);

    let config = match config_warning {
        Some(ConfigLoad::Failed(err)) => {
            error!(error = %err, "加载指定配置失败");
            eprintln!("错误: {err:#}");
            return ExitCode::FAILURE;
        }
        Some(ConfigLoad::Fallback(message)) => {
            warn!(error = %message, "加载默认配置失败，使用内建默认值");
            config
        }
        None => config,
    };

    let result = match cli.command {
        Command::Extract(args) => run_extract(args, &config),
        Command::Inspect { file } => inspect::run(&file, &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "执行失败");
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_extract(args: ExtractArgs, config: &AppConfig) -> Result<()> {
    let fallback = args
        .image_size
        .map(|size| (size.width, size.height))
        .or_else(|| config.raster.default_size());
    let options = BatchOptions {
        input: args.input,
        output: args.output,
        raster: RasterLookup {
            directory: args.raster_dir,
            fallback,
            extensions: config.raster.image_extensions.clone(),
            axes: config.raster.axes,
        },
        jobs: args.jobs.or(config.batch.jobs),
        icdar: args.icdar || config.batch.icdar,
    };

    info!(
        input = %options.input.display(),
        output = %options.output.display(),
        "开始批量提取"
    );
    let summary = batch::run(&options, config)?;
    println!(
        "共 {} 张图纸：完成 {}，跳过 {}，需复核 {}",
        summary.total(),
        summary.processed,
        summary.skipped,
        summary.flagged
    );
    Ok(())
}

enum ConfigLoad {
    Failed(anyhow::Error),
    Fallback(ConfigError),
}

/// 显式指定的配置读取失败视为参数错误；自动发现失败则回退到默认值。
fn load_configuration(override_path: Option<&PathBuf>) -> (AppConfig, Option<ConfigLoad>) {
    match override_path {
        Some(path) => match AppConfig::from_file(path)
            .with_context(|| format!("无法读取配置 {}", path.display()))
        {
            Ok(config) => (config, None),
            Err(err) => (AppConfig::default(), Some(ConfigLoad::Failed(err))),
        },
        None => match AppConfig::discover() {
            Ok(config) => (config, None),
            Err(err) => (AppConfig::default(), Some(ConfigLoad::Fallback(err))),
        },
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_parses_width_and_height() {
        assert_eq!(
            "4000x2800".parse::<ImageSize>(),
            Ok(ImageSize {
                width: 4000,
                height: 2800
            })
        );
        assert_eq!(
            " 640 X 480 ".trim().parse::<ImageSize>(),
            Ok(ImageSize {
                width: 640,
                height: 480
            })
        );
        assert!("4000".parse::<ImageSize>().is_err());
        assert!("0x10".parse::<ImageSize>().is_err());
        assert!("axb".parse::<ImageSize>().is_err());
    }

    #[test]
    fn cli_rejects_raster_dir_with_image_size() {
        let parsed = Cli::try_parse_from([
            "pidlabel",
            "extract",
            "--input",
            "in",
            "--output",
            "out",
            "--raster-dir",
            "png",
            "--image-size",
            "10x10",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_parses_extract_flags() {
        let cli = Cli::try_parse_from([
            "pidlabel",
            "extract",
            "--input",
            "in",
            "--output",
            "out",
            "--image-size",
            "800x600",
            "--jobs",
            "2",
            "--icdar",
        ])
        .expect("参数应合法");
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.jobs, Some(2));
                assert!(args.icdar);
                assert_eq!(
                    args.image_size,
                    Some(ImageSize {
                        width: 800,
                        height: 600
                    })
                );
            }
            other => panic!("期望 extract 子命令，实际为 {other:?}"),
        }
    }
}
