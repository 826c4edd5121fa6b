// LLM模块 - 菜品分析的类型与视觉模型接口

pub mod gemini;

pub use gemini::GeminiProvider;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use llm_json::{loads, repair_json, RepairOptions};
use serde::{Deserialize, Deserializer, Serialize};

/// 菜品分类
///
/// 序列化成固定的三个英文小写值，和数据库入库脚本的约定一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DishCategory {
    Appetizer,
    Main,
    Dessert,
}

impl Default for DishCategory {
    fn default() -> Self {
        DishCategory::Main
    }
}

impl DishCategory {
    /// 归一化模型返回的分类标签
    ///
    /// 同义词归并（starter → appetizer, sweet → dessert），
    /// 其余一律落到 main。
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();
        match normalized.as_str() {
            "appetizer" | "starter" => DishCategory::Appetizer,
            "dessert" | "sweet" => DishCategory::Dessert,
            _ => DishCategory::Main,
        }
    }

    /// 获取分类的中文名称
    pub fn to_chinese(&self) -> &str {
        match self {
            DishCategory::Appetizer => "前菜",
            DishCategory::Main => "主菜",
            DishCategory::Dessert => "甜点",
        }
    }
}

/// 宽容地解析分类字段
///
/// 模型会写出 "Starter"、"主菜" 之类的变体，缺失或类型不对时退回默认值。
fn deserialize_category<'de, D>(deserializer: D) -> Result<DishCategory, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => DishCategory::from_label(&s),
        _ => DishCategory::default(),
    })
}

/// 单张菜品图片的分析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishAnalysis {
    /// 菜名（必填，缺了就当解析失败）
    pub name: String,
    /// 食材清单
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// 制作步骤，顺序有意义
    #[serde(default)]
    pub process: Vec<String>,
    /// 菜品分类
    #[serde(default, deserialize_with = "deserialize_category")]
    pub category: DishCategory,
    /// 风味、做法等简短标签
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 结果文件中的一条记录：分析字段加上图片相对路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishRecord {
    #[serde(flatten)]
    pub analysis: DishAnalysis,
    /// 图片相对项目根目录的路径，统一正斜杠
    pub image: String,
}

/// 视觉模型提供商接口
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// 分析一张菜品图片（base64 编码的原始字节和对应的 MIME 类型）
    async fn analyze_dish(&self, image_base64: &str, mime_type: &str) -> Result<DishAnalysis>;

    /// 获取提供商名称
    fn name(&self) -> &str;

    /// 检查提供商是否已配置
    fn is_configured(&self) -> bool;
}

/// 构建菜品分析提示词
pub fn build_dish_prompt() -> String {
    r#"分析这张菜品照片，完成以下任务：

1. 识别菜品名称
2. 根据外观和常见做法推断主要食材
3. 根据外观和常见做法推断制作步骤
4. 判断菜品分类，只能从 appetizer（前菜）、main（主菜）、dessert（甜点）中选一个
5. 给出几个简短的标签（口味、做法、场合等）

以 JSON 对象返回，格式如下：
{
  "name": "菜品名称",
  "ingredients": ["食材1", "食材2"],
  "process": ["步骤1", "步骤2"],
  "category": "appetizer 或 main 或 dessert",
  "tags": ["标签1", "标签2"]
}

除 category 必须使用上面的英文值外，其余内容用中文。只返回 JSON 对象本身，不要附加说明文字。"#
        .to_string()
}

/// 解析模型回复为菜品分析结果
///
/// 模型偶尔把 JSON 包在代码块或说明文字里，先剥掉 Markdown 围栏，
/// 再截取第一个 '{' 到最后一个 '}' 之间的内容；严格解析失败后
/// 用 llm_json 修复再试一次。
pub fn parse_dish_reply(raw: &str) -> Result<DishAnalysis> {
    let cleaned = strip_code_fence(raw.trim());
    if cleaned.is_empty() {
        return Err(anyhow!("模型没有返回内容"));
    }

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned.as_str(),
    };

    let analysis: DishAnalysis = match serde_json::from_str(json_str) {
        Ok(parsed) => parsed,
        Err(_) => {
            // 严格解析失败，尝试修复常见的 JSON 瑕疵（尾逗号、单引号等）
            let repaired = repair_json(json_str, &RepairOptions::default())
                .map_err(|e| anyhow!("无法修复模型返回的 JSON: {}", e))?;
            let value = loads(&repaired, &RepairOptions::default())
                .map_err(|e| anyhow!("解析修复后的 JSON 失败: {}", e))?;
            serde_json::from_value(value).map_err(|e| anyhow!("JSON 结构不符合预期: {}", e))?
        }
    };

    if analysis.name.trim().is_empty() {
        return Err(anyhow!("模型回复缺少菜品名称"));
    }

    Ok(analysis)
}

/// 剥掉 Markdown 代码块围栏
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines: Vec<&str> = trimmed.lines().collect();
    if !lines.is_empty() {
        lines.remove(0); // 去掉 ```json 行
    }
    if let Some(last) = lines.last() {
        if last.trim() == "```" {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}
