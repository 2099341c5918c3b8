use crate::error::{Error, Result};
use crate::model::BaselineQuestion;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// The persisted corpus document: the full baseline question set for
/// one agent domain. This is the only file format the tracker owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub schema_version: u32,
    pub agent_type: String,
    pub questions: Vec<BaselineQuestion>,
}

impl Corpus {
    pub fn new(agent_type: impl Into<String>, questions: Vec<BaselineQuestion>) -> Self {
        Self {
            schema_version: SUPPORTED_SCHEMA_VERSION,
            agent_type: agent_type.into(),
            questions,
        }
    }

    /// Parse a raw replacement document. Accepts the full corpus shape
    /// or the legacy bare array of questions; anything else is a typed
    /// parse error and nothing downstream is written.
    pub fn from_json_str(raw: &str, agent_type: &str) -> Result<Self> {
        match serde_json::from_str::<Corpus>(raw) {
            Ok(corpus) => {
                if corpus.schema_version != SUPPORTED_SCHEMA_VERSION {
                    return Err(Error::CorpusParse(format!(
                        "unsupported corpus schema version {}",
                        corpus.schema_version
                    )));
                }
                Ok(corpus)
            }
            Err(doc_err) => match serde_json::from_str::<Vec<BaselineQuestion>>(raw) {
                Ok(questions) => Ok(Corpus::new(agent_type, questions)),
                Err(_) => Err(Error::CorpusParse(doc_err.to_string())),
            },
        }
    }

    pub fn load<P: AsRef<Path>>(path: P, agent_type: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw, agent_type)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        // Pretty print for git diffability
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn validate(&self, current_agent: &str) -> Result<()> {
        if self.agent_type != current_agent {
            return Err(Error::validation(
                "agent_type",
                format!(
                    "corpus agent mismatch (expected '{}', found '{}')",
                    current_agent, self.agent_type
                ),
            ));
        }

        let mut seen = HashSet::new();
        for q in &self.questions {
            if !seen.insert(q.id) {
                return Err(Error::validation(
                    "id",
                    format!("duplicate question id {}", q.id),
                ));
            }
            if q.question.trim().is_empty() {
                return Err(Error::validation(
                    "question",
                    format!("question {} has empty text", q.id),
                ));
            }
            if q.expected_answer.trim().is_empty() {
                return Err(Error::validation(
                    "expected_answer",
                    format!("question {} has empty expected answer", q.id),
                ));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: i64) -> Option<&BaselineQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Content fingerprint over the canonical JSON encoding, for cheap
    /// change detection between replace operations.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}
