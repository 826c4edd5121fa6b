// MPO 过滤任务 - 把混在原始图片里的 MPO 文件挑出来移走

use crate::config::PipelineConfig;
use crate::scan::{scan_images, IMAGE_EXTENSIONS};
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// APP2 段载荷的 MPF 标识（CIPA DC-007）
const MPF_IDENTIFIER: &[u8; 4] = b"MPF\0";

/// 过滤统计
#[derive(Debug, Default, Clone)]
pub struct FilterReport {
    /// 扫描的文件数
    pub scanned: usize,
    /// 移动到 MPO 目录的文件数
    pub moved: usize,
    /// 检查或移动失败的文件数
    pub failed: usize,
}

/// 扫描原始图片目录，把 MPO 文件移动到 MPO 目录
///
/// 单个文件出错只记日志并继续，不中断整个任务。
pub fn run(config: &PipelineConfig) -> Result<FilterReport> {
    fs::create_dir_all(&config.mpo_dir)
        .with_context(|| format!("创建目录失败: {:?}", config.mpo_dir))?;

    let paths = scan_images(&config.image_dir, IMAGE_EXTENSIONS)?;
    info!("在 {:?} 扫描到 {} 个图片文件", config.image_dir, paths.len());

    let mut report = FilterReport {
        scanned: paths.len(),
        ..Default::default()
    };

    for path in paths {
        let Some(file_name) = path.file_name() else {
            continue;
        };

        match is_mpo_file(&path) {
            Ok(true) => {
                let dest = config.mpo_dir.join(file_name);
                match fs::rename(&path, &dest) {
                    Ok(()) => {
                        info!("✓ 发现 MPO 图片: {:?}，已移动到 {:?}", file_name, config.mpo_dir);
                        report.moved += 1;
                    }
                    Err(e) => {
                        warn!("✗ 移动失败 {:?}: {}", path, e);
                        report.failed += 1;
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!("✗ 检查失败 {:?}: {}", path, e);
                report.failed += 1;
            }
        }
    }

    info!("过滤完成: 扫描 {}, 移动 {}, 失败 {}", report.scanned, report.moved, report.failed);
    Ok(report)
}

/// 判断文件是否为 MPO 容器
///
/// MPO 本质上还是 JPEG 流，区别在于带一个载荷以 "MPF\0" 开头的
/// APP2 段。顺着 marker 链找到 SOS 之前的 APP2 段就能判定，
/// 不需要解码图像数据。文件句柄在函数返回时关闭，之后移动才安全。
pub fn is_mpo_file(path: &Path) -> Result<bool> {
    let file = fs::File::open(path).with_context(|| format!("打开文件失败: {:?}", path))?;
    let mut reader = BufReader::new(file);

    match has_mpf_segment(&mut reader) {
        Ok(found) => Ok(found),
        // 截断的流按非 MPO 处理
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("读取文件失败: {:?}", path)),
    }
}

/// 顺着 JPEG marker 链查找 MPF 标识的 APP2 段
fn has_mpf_segment<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut soi = [0u8; 2];
    reader.read_exact(&mut soi)?;
    if soi != [0xFF, 0xD8] {
        // 不是 JPEG 流
        return Ok(false);
    }

    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        if byte[0] != 0xFF {
            // marker 链断了，不再当作合法 JPEG
            return Ok(false);
        }

        // 段之间允许填充 0xFF
        let mut marker = [0u8; 1];
        reader.read_exact(&mut marker)?;
        while marker[0] == 0xFF {
            reader.read_exact(&mut marker)?;
        }

        match marker[0] {
            // SOS 之后是压缩数据，EOI 是流结束，APP 段不会再出现
            0xDA | 0xD9 => return Ok(false),
            // TEM 与 RST 没有长度字段
            0x01 | 0xD0..=0xD7 => continue,
            code => {
                let mut len_bytes = [0u8; 2];
                reader.read_exact(&mut len_bytes)?;
                let length = u16::from_be_bytes(len_bytes);
                if length < 2 {
                    return Ok(false);
                }
                let mut remaining = (length - 2) as usize;

                // APP2 段先读前四个字节比对标识
                if code == 0xE2 && remaining >= MPF_IDENTIFIER.len() {
                    let mut identifier = [0u8; 4];
                    reader.read_exact(&mut identifier)?;
                    remaining -= identifier.len();
                    if &identifier == MPF_IDENTIFIER {
                        return Ok(true);
                    }
                }

                skip_bytes(reader, remaining)?;
            }
        }
    }
}

fn skip_bytes<R: Read>(reader: &mut R, count: usize) -> io::Result<()> {
    io::copy(&mut reader.by_ref().take(count as u64), &mut io::sink())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// 最小的 MPO 字节流：SOI + 带 MPF 标识的 APP2 + EOI
    fn mpo_bytes() -> Vec<u8> {
        vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xE2, 0x00, 0x06, b'M', b'P', b'F', 0x00, // APP2 "MPF\0"
            0xFF, 0xD9, // EOI
        ]
    }

    /// 普通 JPEG 字节流：SOI + JFIF APP0 + EOI
    fn plain_jpeg_bytes() -> Vec<u8> {
        vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, 0x00, 0x10, // APP0, 长度 16
            b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00,
            0xFF, 0xD9, // EOI
        ]
    }

    /// 带 ICC APP2 段的 JPEG：有 APP2 但不是 MPF
    fn icc_jpeg_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE2, 0x00, 0x0E];
        bytes.extend_from_slice(b"ICC_PROFILE\0");
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn test_is_mpo_detects_mpf_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.jpg");
        std::fs::write(&path, mpo_bytes()).unwrap();

        assert!(is_mpo_file(&path).unwrap());
    }

    #[test]
    fn test_is_mpo_rejects_plain_jpeg() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flat.jpg");
        std::fs::write(&path, plain_jpeg_bytes()).unwrap();

        assert!(!is_mpo_file(&path).unwrap());
    }

    #[test]
    fn test_is_mpo_rejects_app2_without_mpf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("icc.jpg");
        std::fs::write(&path, icc_jpeg_bytes()).unwrap();

        assert!(!is_mpo_file(&path).unwrap());
    }

    #[test]
    fn test_is_mpo_rejects_non_jpeg_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n0000").unwrap();

        assert!(!is_mpo_file(&path).unwrap());
    }

    #[test]
    fn test_is_mpo_rejects_truncated_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cut.jpg");
        // 声称 APP2 段有 32 字节，实际在长度字段后就结束
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE2, 0x00, 0x20]).unwrap();

        assert!(!is_mpo_file(&path).unwrap());
    }

    #[test]
    fn test_run_moves_only_mpo_files() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::new(dir.path());
        std::fs::create_dir_all(&config.image_dir).unwrap();
        std::fs::write(config.image_dir.join("stereo.jpg"), mpo_bytes()).unwrap();
        std::fs::write(config.image_dir.join("flat.jpg"), plain_jpeg_bytes()).unwrap();

        let report = run(&config).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.moved, 1);
        assert_eq!(report.failed, 0);
        // MPO 进了 mpo_dir，普通图片留在原地
        assert!(config.mpo_dir.join("stereo.jpg").exists());
        assert!(!config.image_dir.join("stereo.jpg").exists());
        assert!(config.image_dir.join("flat.jpg").exists());
    }

    #[test]
    fn test_run_with_empty_directory() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::new(dir.path());
        std::fs::create_dir_all(&config.image_dir).unwrap();

        let report = run(&config).unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(report.moved, 0);
    }
}
