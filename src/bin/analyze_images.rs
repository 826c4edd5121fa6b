// 图片分析任务入口 - 并发调用视觉模型批量提取菜谱信息

use anyhow::{anyhow, Result};
use dish_pipeline::config::{PipelineConfig, API_KEY_ENV};
use dish_pipeline::llm::GeminiProvider;
use dish_pipeline::{analyze, logger};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logger::init("analyze_images")?;

    // 密钥缺失直接中止，不碰任何文件
    let api_key = std::env::var(API_KEY_ENV)
        .map_err(|_| anyhow!("环境变量 {} 未设置，无法调用视觉模型", API_KEY_ENV))?;

    let config = PipelineConfig::default();

    let mut provider = GeminiProvider::new(reqwest::Client::new());
    provider.set_api_key(api_key);
    provider.set_model(config.model.clone());

    let report = analyze::run(&config, Arc::new(provider)).await?;

    info!(
        "任务结束: 成功 {}, 失败 {}, 结果文件 {:?}",
        report.succeeded, report.failed, report.output_file
    );
    Ok(())
}
