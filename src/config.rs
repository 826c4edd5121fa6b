// 管线配置 - 四个任务共享的目录布局与阈值

use std::path::{Path, PathBuf};

/// 存放视觉模型 API 密钥的环境变量名
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// 管线配置
///
/// 所有路径都从 `base_dir` 派生，与数据仓库的目录约定一致。
/// 测试可以把 `base_dir` 指向临时目录，字段是公开的，单项覆盖即可。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 项目根目录，也是结果文件中图片相对路径的锚点
    pub base_dir: PathBuf,
    /// 原始图片目录
    pub image_dir: PathBuf,
    /// 过滤出的 MPO 图片目录
    pub mpo_dir: PathBuf,
    /// 压缩后图片的输出目录
    pub small_image_dir: PathBuf,
    /// 分析结果目录
    pub output_dir: PathBuf,
    /// 分析结果文件
    pub output_file: PathBuf,
    /// 压缩目标上限（字节），达到或超过该值的图片会被压缩
    pub max_file_size: u64,
    /// 分析任务的并发上限
    pub max_concurrency: usize,
    /// 视觉模型名称
    pub model: String,
}

impl PipelineConfig {
    /// 以指定根目录构造配置
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let image_dir = base_dir.join("data").join("raw").join("images");
        let mpo_dir = base_dir.join("data").join("raw").join("mpo_images");
        let small_image_dir = base_dir.join("data").join("raw").join("small_images");
        let output_dir = base_dir.join("data").join("processed");
        let output_file = output_dir.join("image_analysis_results.json");

        Self {
            base_dir,
            image_dir,
            mpo_dir,
            small_image_dir,
            output_dir,
            output_file,
            max_file_size: 1024 * 1024,
            max_concurrency: 4,
            model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derived_from_base_dir() {
        let config = PipelineConfig::new("/tmp/dishes");

        assert_eq!(config.base_dir, PathBuf::from("/tmp/dishes"));
        assert_eq!(config.image_dir, PathBuf::from("/tmp/dishes/data/raw/images"));
        assert_eq!(config.mpo_dir, PathBuf::from("/tmp/dishes/data/raw/mpo_images"));
        assert_eq!(
            config.small_image_dir,
            PathBuf::from("/tmp/dishes/data/raw/small_images")
        );
        assert_eq!(config.output_dir, PathBuf::from("/tmp/dishes/data/processed"));
        assert_eq!(
            config.output_file,
            PathBuf::from("/tmp/dishes/data/processed/image_analysis_results.json")
        );
    }

    #[test]
    fn test_default_values() {
        let config = PipelineConfig::default();

        assert_eq!(config.base_dir, PathBuf::from("."));
        assert_eq!(config.max_file_size, 1024 * 1024);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.model, "gemini-1.5-flash");
    }
}
