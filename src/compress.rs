// 图片压缩任务 - 把超过阈值的图片压到阈值以下

use crate::config::PipelineConfig;
use crate::scan::{scan_images, COMPRESS_EXTENSIONS};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// JPEG 质量阶梯：95 起步，每次降 5，降到 15 为止
const QUALITY_MAX: u8 = 95;
const QUALITY_MIN: u8 = 15;
const QUALITY_STEP: u8 = 5;

/// 缩放阶梯固定使用的 JPEG 质量
const RESIZE_QUALITY: u8 = 85;

/// 压缩统计
#[derive(Debug, Default, Clone)]
pub struct CompressReport {
    /// 成功写出的文件数（含直接复制）
    pub succeeded: usize,
    /// 失败的文件数（解码失败或压不下去）
    pub failed: usize,
}

/// 单个文件的压缩结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOutcome {
    /// 原本就低于阈值，原样复制
    Copied { bytes: u64 },
    /// 重编码成功；PNG 没有质量参数，quality 为 None
    Reencoded { quality: Option<u8>, bytes: u64 },
    /// 缩小尺寸后成功
    Downscaled { width: u32, height: u32, bytes: u64 },
    /// 质量阶梯和缩放阶梯都压不进阈值
    TooLarge,
}

/// 压缩原始图片目录下的所有图片，输出到小图目录
pub fn run(config: &PipelineConfig) -> Result<CompressReport> {
    let paths = scan_images(&config.image_dir, COMPRESS_EXTENSIONS)?;
    if paths.is_empty() {
        info!("目录中没有待压缩的图片: {:?}", config.image_dir);
        return Ok(CompressReport::default());
    }

    fs::create_dir_all(&config.small_image_dir)
        .with_context(|| format!("创建目录失败: {:?}", config.small_image_dir))?;

    info!("找到 {} 张图片: {:?}", paths.len(), config.image_dir);
    info!("目标大小: {:.2}MB 以内", config.max_file_size as f64 / (1024.0 * 1024.0));

    let mut report = CompressReport::default();

    for path in &paths {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let output = config.small_image_dir.join(file_name);

        match compress_file(path, &output, config.max_file_size) {
            Ok(CompressOutcome::Copied { bytes }) => {
                info!("✓ 直接复制 {:?}（{:.2}MB，低于阈值）", file_name, mb(bytes));
                report.succeeded += 1;
            }
            Ok(CompressOutcome::Reencoded { quality, bytes }) => {
                match quality {
                    Some(q) => info!("✓ 压缩完成 {:?}: quality={}, {:.2}MB", file_name, q, mb(bytes)),
                    None => info!("✓ 压缩完成 {:?}: PNG 重编码, {:.2}MB", file_name, mb(bytes)),
                }
                report.succeeded += 1;
            }
            Ok(CompressOutcome::Downscaled { width, height, bytes }) => {
                info!("✓ 缩小完成 {:?}: {}x{}, {:.2}MB", file_name, width, height, mb(bytes));
                report.succeeded += 1;
            }
            Ok(CompressOutcome::TooLarge) => {
                warn!("✗ 无法把 {:?} 压缩到阈值以下", file_name);
                report.failed += 1;
            }
            Err(e) => {
                warn!("✗ 处理 {:?} 出错: {}", file_name, e);
                report.failed += 1;
            }
        }
    }

    info!("{}", "=".repeat(60));
    info!("处理完成!");
    info!("✓ 成功: {}", report.succeeded);
    info!("✗ 失败: {}", report.failed);
    info!("输出目录: {:?}", config.small_image_dir);
    info!("{}", "=".repeat(60));

    Ok(report)
}

/// 把单个文件压到 max_size 字节以下，写入 output
///
/// 低于阈值的输入原样复制并保留修改时间。超过阈值的先走质量阶梯，
/// 不行再走缩放阶梯；所有尝试都在内存里编码，只有小于阈值的结果
/// 才会落盘，两个阶梯都失败时不产生输出文件。
pub fn compress_file(input: &Path, output: &Path, max_size: u64) -> Result<CompressOutcome> {
    let input_size = fs::metadata(input)
        .with_context(|| format!("读取文件信息失败: {:?}", input))?
        .len();

    if input_size < max_size {
        copy_with_mtime(input, output)?;
        return Ok(CompressOutcome::Copied { bytes: input_size });
    }

    let bytes = fs::read(input).with_context(|| format!("读取文件失败: {:?}", input))?;
    let decoded =
        image::load_from_memory(&bytes).with_context(|| format!("解码失败: {:?}", input))?;
    let flattened = flatten_to_rgb(&decoded);

    // 输出格式跟随扩展名，MPO 伪装的 .jpg 也会得到 .jpg
    let png_output = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));

    // 第一阶梯：逐级降低质量重编码
    if png_output {
        // PNG 没有质量参数，只做一次最高压缩比的重编码
        let buf = encode_png(&flattened)?;
        if (buf.len() as u64) < max_size {
            fs::write(output, &buf).with_context(|| format!("写入失败: {:?}", output))?;
            return Ok(CompressOutcome::Reencoded { quality: None, bytes: buf.len() as u64 });
        }
    } else {
        for quality in (QUALITY_MIN..=QUALITY_MAX).rev().step_by(QUALITY_STEP as usize) {
            let buf = encode_jpeg(&flattened, quality)?;
            if (buf.len() as u64) < max_size {
                fs::write(output, &buf).with_context(|| format!("写入失败: {:?}", output))?;
                return Ok(CompressOutcome::Reencoded {
                    quality: Some(quality),
                    bytes: buf.len() as u64,
                });
            }
        }
    }

    warn!("⚠ 降质量不够，尝试缩小尺寸: {:?}", input.file_name());

    // 第二阶梯：按比例缩小，90% 起每次降 10%，降到 30% 为止
    let (orig_width, orig_height) = (flattened.width(), flattened.height());
    for percent in (30..=90u32).rev().step_by(10) {
        let width = orig_width * percent / 100;
        let height = orig_height * percent / 100;
        if width == 0 || height == 0 {
            break;
        }

        let resized = image::imageops::resize(&flattened, width, height, FilterType::Lanczos3);
        let buf = if png_output {
            encode_png(&resized)?
        } else {
            encode_jpeg(&resized, RESIZE_QUALITY)?
        };
        if (buf.len() as u64) < max_size {
            fs::write(output, &buf).with_context(|| format!("写入失败: {:?}", output))?;
            return Ok(CompressOutcome::Downscaled { width, height, bytes: buf.len() as u64 });
        }
    }

    // 最后一次尝试也超标，宁缺毋滥
    Ok(CompressOutcome::TooLarge)
}

/// 把带透明通道的图片平铺到白色背景上，统一为 8 位 RGB
fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = src[3] as u32;
        for c in 0..3 {
            let value = src[c] as u32 * alpha + 255 * (255 - alpha);
            dst[c] = (value / 255) as u8;
        }
    }
    rgb
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        .with_context(|| format!("JPEG 编码失败 (quality={})", quality))?;
    Ok(buf)
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        &mut buf,
        CompressionType::Best,
        image::codecs::png::FilterType::Adaptive,
    );
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        .context("PNG 编码失败")?;
    Ok(buf)
}

/// 复制文件并保留源文件的修改时间
fn copy_with_mtime(input: &Path, output: &Path) -> Result<()> {
    fs::copy(input, output)
        .with_context(|| format!("复制失败: {:?} -> {:?}", input, output))?;

    let metadata = fs::metadata(input)
        .with_context(|| format!("读取文件信息失败: {:?}", input))?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(output, mtime)
        .with_context(|| format!("设置修改时间失败: {:?}", output))?;

    Ok(())
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
