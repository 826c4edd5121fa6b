// 目录扫描 - 按扩展名收集图片文件

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// 原始图片目录里参与过滤与分析的扩展名
///
/// MPO 文件几乎总是顶着 .jpg 后缀出现，所以过滤任务也要扫这些。
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// MPO 目录中可能出现的扩展名
pub const MPO_SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "mpo"];

/// 参与压缩的扩展名
pub const COMPRESS_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// 枚举目录下扩展名匹配的文件
///
/// 扩展名不区分大小写（.JPG 和 .jpg 都算），不递归子目录，
/// 结果按路径排序保证日志顺序稳定。目录不存在时返回空列表。
pub fn scan_images(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries =
        std::fs::read_dir(dir).with_context(|| format!("读取目录失败: {:?}", dir))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("读取目录项失败: {:?}", dir))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
