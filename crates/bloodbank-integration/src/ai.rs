//! 生成式 AI 提供方
//!
//! 通过 REST 接口调用 Google Gemini 与 Azure OpenAI，实现助手的 `GenerativeBackend`。
//! Gemini 配置了密钥时优先使用，其次是 Azure OpenAI。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bloodbank_assistant::GenerativeBackend;
use bloodbank_core::{BloodBankError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 800;

/// AI 提供方配置
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            azure_endpoint: None,
            azure_api_key: None,
            azure_deployment: None,
            azure_api_version: "2024-10-21".to_string(),
            timeout_secs: 30,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// 按优先级构建已配置的后端
pub fn backends_from_settings(settings: &AiSettings) -> Result<Vec<Arc<dyn GenerativeBackend>>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|e| BloodBankError::Config(format!("Failed to build HTTP client: {}", e)))?;

    let mut backends: Vec<Arc<dyn GenerativeBackend>> = Vec::new();

    if let Some(key) = non_empty(&settings.gemini_api_key) {
        info!("Google Gemini provider enabled ({})", settings.gemini_model);
        backends.push(Arc::new(GeminiBackend::new(
            client.clone(),
            key.to_string(),
            settings.gemini_model.clone(),
        )));
    }

    if let (Some(endpoint), Some(key), Some(deployment)) = (
        non_empty(&settings.azure_endpoint),
        non_empty(&settings.azure_api_key),
        non_empty(&settings.azure_deployment),
    ) {
        info!("Azure OpenAI provider enabled ({})", deployment);
        backends.push(Arc::new(AzureOpenAiBackend::new(
            client,
            endpoint.to_string(),
            key.to_string(),
            deployment.to_string(),
            settings.azure_api_version.clone(),
        )));
    }

    Ok(backends)
}

async fn post_json(request: reqwest::RequestBuilder, body: &Value, provider: &str) -> Result<String> {
    let start = Instant::now();
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| BloodBankError::ExternalService(format!("{} request failed: {}", provider, e)))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| BloodBankError::ExternalService(format!("{} response unreadable: {}", provider, e)))?;

    debug!(
        provider = provider,
        status = %status,
        latency_ms = start.elapsed().as_millis() as u64,
        "AI provider responded"
    );

    if !status.is_success() {
        error!(provider = provider, status = %status, "AI provider error: {}", text);
        return Err(BloodBankError::ExternalService(format!(
            "{} returned status {}",
            provider, status
        )));
    }

    Ok(text)
}

/// Google Gemini 后端
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
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

impl GeminiBackend {
    pub fn new(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    fn request_body(system_prompt: &str, user_message: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{}\n\nUser Query: {}", system_prompt, user_message) }]
            }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_TOKENS
            }
        })
    }

    fn extract_text(body: &str) -> Result<String> {
        let response: GeminiResponse = serde_json::from_str(body)?;
        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Google Gemini"
    }

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            GEMINI_BASE_URL, self.model
        );
        let request = self.client.post(&url).query(&[("key", self.api_key.as_str())]);
        let body = post_json(request, &Self::request_body(system_prompt, user_message), self.name()).await?;
        Self::extract_text(&body)
    }
}

/// Azure OpenAI 后端（Chat Completions）
pub struct AzureOpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl AzureOpenAiBackend {
    pub fn new(
        client: reqwest::Client,
        endpoint: String,
        api_key: String,
        deployment: String,
        api_version: String,
    ) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            deployment,
            api_version,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint.trim_end_matches('/'),
            self.deployment
        )
    }

    fn request_body(&self, system_prompt: &str, user_message: &str) -> Value {
        json!({
            "model": self.deployment,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message }
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS
        })
    }

    fn extract_text(body: &str) -> Result<String> {
        let completion: ChatCompletion = serde_json::from_str(body)?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl GenerativeBackend for AzureOpenAiBackend {
    fn name(&self) -> &str {
        "Azure OpenAI"
    }

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String> {
        let request = self
            .client
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key);
        let body = post_json(request, &self.request_body(system_prompt, user_message), self.name()).await?;
        Self::extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_credentials_means_no_backends() {
        let backends = backends_from_settings(&AiSettings::default()).unwrap();
        assert!(backends.is_empty());

        let blank = AiSettings {
            gemini_api_key: Some("  ".to_string()),
            ..AiSettings::default()
        };
        assert!(backends_from_settings(&blank).unwrap().is_empty());
    }

    #[test]
    fn test_gemini_preferred_over_azure() {
        let settings = AiSettings {
            gemini_api_key: Some("g-key".to_string()),
            azure_endpoint: Some("https://example.openai.azure.com/".to_string()),
            azure_api_key: Some("a-key".to_string()),
            azure_deployment: Some("gpt-4o".to_string()),
            ..AiSettings::default()
        };
        let names: Vec<String> = backends_from_settings(&settings)
            .unwrap()
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["Google Gemini", "Azure OpenAI"]);
    }

    #[test]
    fn test_azure_requires_all_fields() {
        let settings = AiSettings {
            azure_endpoint: Some("https://example.openai.azure.com".to_string()),
            azure_api_key: Some("a-key".to_string()),
            ..AiSettings::default()
        };
        assert!(backends_from_settings(&settings).unwrap().is_empty());
    }

    #[test]
    fn test_gemini_request_and_response() {
        let body = GeminiBackend::request_body("SYSTEM", "How much O- do we have?");
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert_eq!(text, "SYSTEM\n\nUser Query: How much O- do we have?");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 800);

        let response = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"there"}]}}]}"#;
        assert_eq!(GeminiBackend::extract_text(response).unwrap(), "Hello there");
        assert_eq!(GeminiBackend::extract_text(r#"{"candidates":[]}"#).unwrap(), "");
        assert!(GeminiBackend::extract_text("not json").is_err());
    }

    #[test]
    fn test_azure_request_and_response() {
        let backend = AzureOpenAiBackend::new(
            reqwest::Client::new(),
            "https://example.openai.azure.com/".to_string(),
            "a-key".to_string(),
            "gpt-4o".to_string(),
            "2024-10-21".to_string(),
        );
        assert_eq!(
            backend.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions"
        );

        let body = backend.request_body("SYSTEM", "hi");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 800);

        let response = r#"{"choices":[{"message":{"role":"assistant","content":"Stock is fine"}}]}"#;
        assert_eq!(AzureOpenAiBackend::extract_text(response).unwrap(), "Stock is fine");
        assert_eq!(AzureOpenAiBackend::extract_text(r#"{"choices":[]}"#).unwrap(), "");
    }
}
