// MPO 转换任务 - 取第一帧另存为 PNG

use crate::config::PipelineConfig;
use crate::scan::{scan_images, MPO_SOURCE_EXTENSIONS};
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 转换统计
#[derive(Debug, Default, Clone)]
pub struct ConvertReport {
    /// 扫描的文件数
    pub scanned: usize,
    /// 成功转换的文件数
    pub converted: usize,
    /// 转换失败的文件数
    pub failed: usize,
}

/// 把 MPO 目录下的文件逐个转成 PNG，写入原始图片目录
///
/// MPO 目录不存在不算错误，记一条日志返回空统计即可。
pub fn run(config: &PipelineConfig) -> Result<ConvertReport> {
    if !config.mpo_dir.exists() {
        info!("目录不存在，无需转换: {:?}", config.mpo_dir);
        return Ok(ConvertReport::default());
    }

    fs::create_dir_all(&config.image_dir)
        .with_context(|| format!("创建目录失败: {:?}", config.image_dir))?;

    let paths = scan_images(&config.mpo_dir, MPO_SOURCE_EXTENSIONS)?;
    info!("在 {:?} 找到 {} 个待转换文件", config.mpo_dir, paths.len());

    let mut report = ConvertReport {
        scanned: paths.len(),
        ..Default::default()
    };

    for path in paths {
        match convert_file(&path, &config.image_dir) {
            Ok(output) => {
                info!("✓ 转换完成: {:?} -> {:?}", path, output);
                report.converted += 1;
            }
            Err(e) => {
                warn!("✗ 转换失败 {:?}: {}", path, e);
                report.failed += 1;
            }
        }
    }

    info!("转换完成: 共 {} 个，成功 {}, 失败 {}", report.scanned, report.converted, report.failed);
    Ok(report)
}

/// 解码第一帧并以同名 PNG 写入输出目录，返回输出路径
///
/// JPEG 解码器在第一帧的 EOI 处停止，MPO 的后续帧是近乎相同的
/// 立体视图，丢弃是有意的。输出已存在时直接覆盖。
pub fn convert_file(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("无效的文件名: {:?}", input))?;
    let output_path = output_dir.join(format!("{}.png", stem));

    let bytes = fs::read(input).with_context(|| format!("读取文件失败: {:?}", input))?;
    let decoded =
        image::load_from_memory(&bytes).with_context(|| format!("解码失败: {:?}", input))?;

    // 统一转成 8 位 RGB 再落盘，立体对的视差信息不保留
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    rgb.save_with_format(&output_path, ImageFormat::Png)
        .with_context(|| format!("写入 PNG 失败: {:?}", output_path))?;

    Ok(output_path)
}
