// 食谱图片批处理管线 - 主库

// 声明模块
pub mod analyze;
pub mod compress;
pub mod config;
pub mod convert;
pub mod filter;
pub mod llm;
pub mod logger;
pub mod scan;
