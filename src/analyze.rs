// 图片分析任务 - 并发调用视觉模型提取菜谱信息

use crate::config::PipelineConfig;
use crate::llm::{DishRecord, VisionProvider};
use crate::scan::{scan_images, IMAGE_EXTENSIONS};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

/// 分析统计
#[derive(Debug, Clone)]
pub struct AnalyzeReport {
    /// 成功分析的图片数
    pub succeeded: usize,
    /// 失败的图片数（读取、解码或模型调用失败）
    pub failed: usize,
    /// 结果文件路径
    pub output_file: PathBuf,
}

/// 分析原始图片目录下的所有图片，把成功的结果写成一个 JSON 数组文件
///
/// 每张图片一个任务，信号量限制同时进行的任务数。失败的图片只记
/// 日志，不产生输出条目。所有任务结束后结果文件一次性整体写入，
/// 中途不存在半成品文件；一张都没成功时写出空数组。
pub async fn run(
    config: &PipelineConfig,
    provider: Arc<dyn VisionProvider>,
) -> Result<AnalyzeReport> {
    // 凭证缺失是致命错误，在碰任何文件之前中止
    if !provider.is_configured() {
        return Err(anyhow!("{} 提供商未配置，无法开始分析", provider.name()));
    }

    let paths = scan_images(&config.image_dir, IMAGE_EXTENSIONS)?;
    info!("在 {:?} 找到 {} 张待分析图片", config.image_dir, paths.len());
    info!("并发上限: {}", config.max_concurrency);

    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let (tx, mut rx) = mpsc::unbounded_channel();

    for path in paths {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("获取并发许可失败")?;
        let provider = provider.clone();
        let base_dir = config.base_dir.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let result = analyze_one(&path, &base_dir, provider.as_ref()).await;
            // 接收端不在了说明主流程已经结束，结果丢弃即可
            let _ = tx.send((path, result));
            drop(permit);
        });
    }
    drop(tx);

    // 按完成顺序收集，结果文件里的顺序不做保证
    let mut records: Vec<DishRecord> = Vec::new();
    let mut failed = 0usize;
    while let Some((path, result)) = rx.recv().await {
        match result {
            Ok(record) => {
                info!("✓ {} -> {}", record.image, record.analysis.name);
                records.push(record);
            }
            Err(e) => {
                warn!("✗ 分析失败 {:?}: {}", path, e);
                failed += 1;
            }
        }
    }

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("创建输出目录失败: {:?}", config.output_dir))?;
    let json = serde_json::to_string_pretty(&records).context("序列化分析结果失败")?;
    tokio::fs::write(&config.output_file, json)
        .await
        .with_context(|| format!("写入结果文件失败: {:?}", config.output_file))?;

    info!(
        "分析完成: 成功 {}, 失败 {}, 结果已保存到 {:?}",
        records.len(),
        failed,
        config.output_file
    );

    Ok(AnalyzeReport {
        succeeded: records.len(),
        failed,
        output_file: config.output_file.clone(),
    })
}

/// 分析单张图片
///
/// 先在本地解码验证，坏图不浪费一次远程调用。送给模型的是原始
/// 文件字节的 base64，不是重编码的版本。
async fn analyze_one(
    path: &Path,
    base_dir: &Path,
    provider: &dyn VisionProvider,
) -> Result<DishRecord> {
    info!("开始分析: {:?}", path.file_name());

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("读取文件失败: {:?}", path))?;

    let format =
        image::guess_format(&bytes).with_context(|| format!("无法识别图片格式: {:?}", path))?;
    image::load_from_memory(&bytes).with_context(|| format!("解码失败: {:?}", path))?;

    let image_base64 = general_purpose::STANDARD.encode(&bytes);
    let analysis = provider
        .analyze_dish(&image_base64, format.to_mime_type())
        .await?;

    Ok(DishRecord {
        analysis,
        image: relative_image_path(path, base_dir),
    })
}

/// 图片相对项目根目录的路径，分隔符统一为正斜杠
fn relative_image_path(path: &Path, base_dir: &Path) -> String {
    match path.strip_prefix(base_dir) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
        // 不在根目录下时原样返回
        Err(_) => path.to_string_lossy().into_owned(),
    }
}
