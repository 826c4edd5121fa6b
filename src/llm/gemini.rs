// Gemini提供商实现 - 调用 Google Generative Language API 分析菜品图片

use super::{build_dish_prompt, parse_dish_reply, DishAnalysis, VisionProvider};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Gemini提供商
pub struct GeminiProvider {
    /// API密钥
    api_key: Option<String>,
    /// 使用的模型
    model: String,
    /// HTTP客户端（共享连接池）
    client: reqwest::Client,
    /// API基础URL
    base_url: String,
}

impl GeminiProvider {
    /// 创建新的Gemini提供商
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            client,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    /// 设置API密钥
    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
        debug!("✓ Gemini API密钥已设置");
    }

    /// 设置模型
    pub fn set_model(&mut self, model: String) {
        debug!("设置Gemini模型: {}", model);
        self.model = model;
    }

    /// 调用 generateContent 接口，返回模型的文本回复
    async fn call_gemini_api(
        &self,
        prompt: String,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Gemini API密钥未配置"))?;

        // 图片放在提示词前面，与接口推荐的多模态顺序一致
        let request_body = json!({
            "contents": [
                {
                    "parts": [
                        {
                            "inline_data": {
                                "mime_type": mime_type,
                                "data": image_base64
                            }
                        },
                        {
                            "text": prompt
                        }
                    ]
                }
            ],
            "generation_config": {
                "response_mime_type": "application/json",
                "temperature": 0.3,
                "max_output_tokens": 2048
            }
        });

        let endpoint = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!("调用Gemini API: model={}", self.model);

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Gemini API请求失败: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini API调用失败 ({}): {}", status, error_text));
        }

        let response_data: GeminiResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("解析Gemini API响应失败: {}", e))?;

        let candidate = response_data
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Gemini API返回空结果"))?;

        // 截断的回复是残缺的 JSON，没有使用价值
        if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
            warn!("⚠ Gemini回复因达到token上限被截断");
            return Err(anyhow::anyhow!("Gemini回复被截断 (finishReason=MAX_TOKENS)"));
        }

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(anyhow::anyhow!("Gemini API返回空内容"));
        }

        Ok(text)
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn analyze_dish(&self, image_base64: &str, mime_type: &str) -> Result<DishAnalysis> {
        if !self.is_configured() {
            return Err(anyhow::anyhow!("Gemini API密钥未配置，请设置 GOOGLE_API_KEY"));
        }

        let reply = self
            .call_gemini_api(build_dish_prompt(), image_base64, mime_type)
            .await?;

        parse_dish_reply(&reply)
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Gemini API响应结构
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    /// 完成原因：STOP、MAX_TOKENS 等
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_configuration() {
        let mut provider = GeminiProvider::new(reqwest::Client::new());
        assert!(!provider.is_configured());
        assert_eq!(provider.name(), "Gemini");

        provider.set_api_key("test-key".to_string());
        assert!(provider.is_configured());

        provider.set_model("gemini-1.5-pro".to_string());
        assert_eq!(provider.model, "gemini-1.5-pro");
    }

    #[tokio::test]
    async fn test_analyze_dish_requires_api_key() {
        let provider = GeminiProvider::new(reqwest::Client::new());
        let result = provider.analyze_dish("aGVsbG8=", "image/jpeg").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_response_deserialization() {
        let raw = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [{"text": "{\"name\": \"烤鸭\"}"}]
                    },
                    "finishReason": "STOP"
                }
            ]
        }"#;

        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        let candidate = &response.candidates[0];
        assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
        let content = candidate.content.as_ref().unwrap();
        assert_eq!(content.parts[0].text.as_deref(), Some("{\"name\": \"烤鸭\"}"));
    }

    #[test]
    fn test_response_with_missing_fields() {
        // 安全拦截等情况下 content 可能缺失
        let raw = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert!(response.candidates[0].content.is_none());

        let raw = r#"{}"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert!(response.candidates.is_empty());
    }
}
