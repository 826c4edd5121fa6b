// 图片压缩任务入口

use anyhow::Result;
use dish_pipeline::config::PipelineConfig;
use dish_pipeline::{compress, logger};
use tracing::info;

fn main() -> Result<()> {
    logger::init("compress_images")?;

    let config = PipelineConfig::default();
    let report = compress::run(&config)?;

    info!("任务结束: 成功 {}, 失败 {}", report.succeeded, report.failed);
    Ok(())
}
