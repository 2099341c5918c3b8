use super::{ModelClient, ModelOutput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAiClient {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(model: String, api_key: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: String, temperature: f32, max_tokens: u32) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY is not set".into()))?;
        Ok(Self::new(model, api_key, temperature, max_tokens))
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, prompt: &str, context: Option<&[String]>) -> Result<ModelOutput> {
        let url = "https://api.openai.com/v1/chat/completions";

        let content = if let Some(ctx) = context {
            format!("Context:\n{}\n\nQuestion: {}", ctx.join("\n"), prompt)
        } else {
            prompt.to_string()
        };

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("openai request failed: {e}")))?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "openai chat API error: {error_text}"
            )));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Provider(format!("openai response decode failed: {e}")))?;

        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Provider("openai response missing content".into()))?
            .to_string();

        Ok(ModelOutput {
            text,
            provider: "openai".into(),
            model: self.model.clone(),
            meta: json!({ "usage": payload.get("usage").cloned().unwrap_or(json!(null)) }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
