// MPO 转换任务入口

use anyhow::Result;
use dish_pipeline::config::PipelineConfig;
use dish_pipeline::{convert, logger};
use tracing::info;

fn main() -> Result<()> {
    logger::init("convert_mpo")?;

    let config = PipelineConfig::default();
    let report = convert::run(&config)?;

    info!(
        "任务结束: 扫描 {}, 转换 {}, 失败 {}",
        report.scanned, report.converted, report.failed
    );
    Ok(())
}
