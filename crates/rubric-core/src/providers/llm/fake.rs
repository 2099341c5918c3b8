use super::{ModelClient, ModelOutput};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;

/// Deterministic in-process backend for tests and local development.
pub struct FakeClient {
    pub model: String,
    /// Fixed answer for every prompt; echoes the prompt when unset.
    pub canned: Option<String>,
    /// Fail every call, for exercising the error path.
    pub fail: bool,
}

impl FakeClient {
    pub fn new(model: String) -> Self {
        Self {
            model,
            canned: None,
            fail: false,
        }
    }

    pub fn canned(model: String, answer: impl Into<String>) -> Self {
        Self {
            model,
            canned: Some(answer.into()),
            fail: false,
        }
    }

    pub fn failing(model: String) -> Self {
        Self {
            model,
            canned: None,
            fail: true,
        }
    }
}

#[async_trait]
impl ModelClient for FakeClient {
    async fn complete(&self, prompt: &str, _context: Option<&[String]>) -> Result<ModelOutput> {
        if self.fail {
            return Err(Error::Provider("fake provider failure".into()));
        }
        let text = self
            .canned
            .clone()
            .unwrap_or_else(|| format!("echo: {prompt}"));
        Ok(ModelOutput {
            text,
            provider: "fake".into(),
            model: self.model.clone(),
            meta: json!({ "confidence": 80.0, "cost": 0.0021 }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
