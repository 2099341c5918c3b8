use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// One completion from a model backend.
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub meta: serde_json::Value,
}

impl ModelOutput {
    /// Model-reported confidence, when the backend surfaces one.
    pub fn confidence(&self) -> f64 {
        self.meta
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    pub fn cost(&self) -> Option<f64> {
        self.meta.get("cost").and_then(|v| v.as_f64())
    }
}

/// The run-executor boundary: everything that can answer a prompt.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, prompt: &str, context: Option<&[String]>) -> Result<ModelOutput>;
    fn provider_name(&self) -> &'static str;
    fn model_name(&self) -> &str;
}

pub mod fake;
pub mod openai;

pub fn client_from_config(cfg: &ProviderConfig) -> Result<Arc<dyn ModelClient>> {
    match cfg.provider.as_str() {
        "fake" => Ok(Arc::new(fake::FakeClient::new(cfg.model.clone()))),
        "openai" => {
            let client = openai::OpenAiClient::from_env(
                cfg.model.clone(),
                cfg.temperature,
                cfg.max_tokens,
            )?;
            Ok(Arc::new(client))
        }
        other => Err(Error::Config(format!("unknown provider '{}'", other))),
    }
}
