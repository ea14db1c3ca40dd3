use std::path::Path;

use anyhow::{Context, Result};
use pidlabel_config::AppConfig;
use pidlabel_core::document::EntityKind;
use pidlabel_engine::classify::{PatternTag, classify};
use pidlabel_engine::frame::resolve_frame;
use pidlabel_io::{DocumentLoader, DxfFacade};
use tracing::info;

/// 打印单张图纸的图框与分类统计，便于排查识别结果。
pub fn run(path: &Path, config: &AppConfig) -> Result<()> {
    let document = DxfFacade::new()
        .load(path)
        .with_context(|| format!("无法读取图纸 {}", path.display()))?;

    let count = |kind| document.query(kind).count();
    info!(
        texts = count(EntityKind::Text),
        inserts = count(EntityKind::Insert),
        blocks = document.blocks().count(),
        "图纸实体统计"
    );

    println!("图纸: {}", path.display());
    println!(
        "实体: 文字 {}，块参照 {}，3DFACE {}，多段线 {}，直线 {}",
        count(EntityKind::Text),
        count(EntityKind::Insert),
        count(EntityKind::Face),
        count(EntityKind::Polyline),
        count(EntityKind::Line)
    );

    match resolve_frame(&document, &config.frame) {
        Ok(frame) => println!(
            "图框: 原点=({:.4}, {:.4}) 宽={:.4} 高={:.4} 来源={:?}",
            frame.origin().x(),
            frame.origin().y(),
            frame.width(),
            frame.height(),
            frame.source()
        ),
        Err(err) => println!("图框: {err}"),
    }

    let classification = classify(&document, &config.classifier);
    println!("标签分类:");
    for tag in PatternTag::ALL {
        println!("  {:<3} {}", tag.code(), classification.count(tag));
    }
    let ambiguous = classification.ambiguous_count();
    if ambiguous > 0 {
        println!("旋转角需复核: {ambiguous}");
    }
    Ok(())
}
