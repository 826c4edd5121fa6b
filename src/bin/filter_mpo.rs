// MPO 过滤任务入口

use anyhow::Result;
use dish_pipeline::config::PipelineConfig;
use dish_pipeline::{filter, logger};
use tracing::info;

fn main() -> Result<()> {
    logger::init("filter_mpo")?;

    let config = PipelineConfig::default();
    let report = filter::run(&config)?;

    info!(
        "任务结束: 扫描 {}, 移动 {}, 失败 {}",
        report.scanned, report.moved, report.failed
    );
    Ok(())
}
