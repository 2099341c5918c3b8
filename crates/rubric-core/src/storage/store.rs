use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::model::{
    BaselineQuestion, BaselineTestRun, Difficulty, GradingState, ModelResponse, QuestionPatch,
    ResponseStatus, RunAggregates, RunConfig, RunStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Fields for a response that does not exist yet; the store assigns the
/// id and the initial version.
#[derive(Debug, Clone)]
pub struct NewResponse {
    pub run_id: Option<i64>,
    pub agent_type: String,
    pub question_id: i64,
    pub model: String,
    pub answer: String,
    pub confidence: f64,
    pub response_time_ms: Option<u64>,
    pub cost: Option<f64>,
    pub status: ResponseStatus,
    pub grading: GradingState,
}

#[derive(Debug, Clone)]
pub struct GradeHistoryEntry {
    pub id: i64,
    pub response_id: i64,
    pub source: String,
    pub grade: f64,
    pub payload: serde_json::Value,
    pub recorded_at: String,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // --- questions ---

    pub fn upsert_question(&self, agent_type: &str, q: &BaselineQuestion) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let last_updated = if q.last_updated.is_empty() {
            now_rfc3339()
        } else {
            q.last_updated.clone()
        };
        conn.execute(
            "INSERT INTO questions(agent_type, id, question, expected_answer, category, difficulty, state, tags_json, archived, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(agent_type, id) DO UPDATE SET
               question=excluded.question,
               expected_answer=excluded.expected_answer,
               category=excluded.category,
               difficulty=excluded.difficulty,
               state=excluded.state,
               tags_json=excluded.tags_json,
               archived=excluded.archived,
               last_updated=excluded.last_updated",
            params![
                agent_type,
                q.id,
                q.question,
                q.expected_answer,
                q.category,
                q.difficulty.as_str(),
                q.state,
                serde_json::to_string(&q.tags)?,
                q.archived,
                last_updated,
            ],
        )?;
        Ok(())
    }

    pub fn get_question(&self, agent_type: &str, id: i64) -> Result<BaselineQuestion> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, question, expected_answer, category, difficulty, state, tags_json, archived, last_updated
             FROM questions WHERE agent_type=?1 AND id=?2",
        )?;
        let q = stmt
            .query_row(params![agent_type, id], question_from_row)
            .optional()?;
        q.ok_or_else(|| Error::not_found("question", id))
    }

    pub fn list_questions(
        &self,
        agent_type: &str,
        include_archived: bool,
    ) -> Result<Vec<BaselineQuestion>> {
        let conn = self.conn.lock().unwrap();
        let sql = if include_archived {
            "SELECT id, question, expected_answer, category, difficulty, state, tags_json, archived, last_updated
             FROM questions WHERE agent_type=?1 ORDER BY id ASC"
        } else {
            "SELECT id, question, expected_answer, category, difficulty, state, tags_json, archived, last_updated
             FROM questions WHERE agent_type=?1 AND archived=0 ORDER BY id ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![agent_type], question_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Editor-layer partial update. Bumps `last_updated`; historical
    /// responses tied to the old text are left as graded.
    pub fn update_question_fields(
        &self,
        agent_type: &str,
        id: i64,
        patch: &QuestionPatch,
    ) -> Result<BaselineQuestion> {
        if patch.is_empty() {
            return Err(Error::validation("patch", "no fields to update"));
        }
        let mut q = self.get_question(agent_type, id)?;
        if let Some(question) = &patch.question {
            if question.trim().is_empty() {
                return Err(Error::validation("question", "question text cannot be empty"));
            }
            q.question = question.clone();
        }
        if let Some(expected) = &patch.expected_answer {
            if expected.trim().is_empty() {
                return Err(Error::validation(
                    "expected_answer",
                    "expected answer cannot be empty",
                ));
            }
            q.expected_answer = expected.clone();
        }
        if let Some(category) = &patch.category {
            q.category = category.clone();
        }
        if let Some(difficulty) = patch.difficulty {
            q.difficulty = difficulty;
        }
        if let Some(state) = &patch.state {
            q.state = Some(state.clone());
        }
        q.last_updated = now_rfc3339();
        self.upsert_question(agent_type, &q)?;
        Ok(q)
    }

    pub fn archive_question(&self, agent_type: &str, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE questions SET archived=1, last_updated=?3 WHERE agent_type=?1 AND id=?2",
            params![agent_type, id, now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(Error::not_found("question", id));
        }
        Ok(())
    }

    /// Full corpus replace, all-or-nothing. Existing questions for the
    /// agent are dropped and re-inserted inside one transaction, so a
    /// failing row leaves the prior corpus untouched.
    pub fn replace_corpus(&self, corpus: &Corpus) -> Result<usize> {
        corpus.validate(&corpus.agent_type)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM questions WHERE agent_type=?1",
            params![corpus.agent_type],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO questions(agent_type, id, question, expected_answer, category, difficulty, state, tags_json, archived, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for q in &corpus.questions {
                let last_updated = if q.last_updated.is_empty() {
                    now_rfc3339()
                } else {
                    q.last_updated.clone()
                };
                stmt.execute(params![
                    corpus.agent_type,
                    q.id,
                    q.question,
                    q.expected_answer,
                    q.category,
                    q.difficulty.as_str(),
                    q.state,
                    serde_json::to_string(&q.tags)?,
                    q.archived,
                    last_updated,
                ])?;
            }
        }
        tx.commit()?;
        tracing::info!(
            agent_type = %corpus.agent_type,
            questions = corpus.questions.len(),
            "corpus replaced"
        );
        Ok(corpus.questions.len())
    }

    pub fn export_corpus(&self, agent_type: &str) -> Result<Corpus> {
        let questions = self.list_questions(agent_type, true)?;
        Ok(Corpus::new(agent_type, questions))
    }

    // --- runs ---

    pub fn create_run(&self, cfg: &RunConfig) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs(agent_type, model, state, rag_enabled, tools_enabled, kb_enabled, custom_prompt, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                cfg.agent_type,
                cfg.model,
                cfg.state,
                cfg.rag_enabled,
                cfg.tools_enabled,
                cfg.kb_enabled,
                cfg.custom_prompt,
                RunStatus::Pending.as_str(),
                now_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_run(&self, run_id: i64) -> Result<BaselineTestRun> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, agent_type, model, state, rag_enabled, tools_enabled, kb_enabled, custom_prompt, status, aggregates_json, created_at, completed_at
             FROM runs WHERE id=?1",
        )?;
        let run = stmt.query_row(params![run_id], run_from_row).optional()?;
        run.ok_or_else(|| Error::not_found("run", run_id))
    }

    pub fn list_runs(&self, agent_type: Option<&str>) -> Result<Vec<BaselineTestRun>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        match agent_type {
            Some(agent) => {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_type, model, state, rag_enabled, tools_enabled, kb_enabled, custom_prompt, status, aggregates_json, created_at, completed_at
                     FROM runs WHERE agent_type=?1 ORDER BY id DESC",
                )?;
                let rows = stmt.query_map(params![agent], run_from_row)?;
                for r in rows {
                    out.push(r?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_type, model, state, rag_enabled, tools_enabled, kb_enabled, custom_prompt, status, aggregates_json, created_at, completed_at
                     FROM runs ORDER BY id DESC",
                )?;
                let rows = stmt.query_map([], run_from_row)?;
                for r in rows {
                    out.push(r?);
                }
            }
        }
        Ok(out)
    }

    /// `pending -> running`. Any other source state is a conflict;
    /// there is no transition back to `pending`.
    pub fn start_run(&self, run_id: i64) -> Result<()> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE runs SET status=?1 WHERE id=?2 AND status=?3",
                params![
                    RunStatus::Running.as_str(),
                    run_id,
                    RunStatus::Pending.as_str()
                ],
            )?
        };
        if changed == 0 {
            let run = self.get_run(run_id)?;
            return Err(Error::conflict(format!(
                "run {} cannot start from status '{}'",
                run_id,
                run.status.as_str()
            )));
        }
        Ok(())
    }

    /// `running -> {completed, failed}`. Completion is refused while
    /// any child response is still pending.
    pub fn finalize_run(
        &self,
        run_id: i64,
        status: RunStatus,
        aggregates: &RunAggregates,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::validation(
                "status",
                format!("'{}' is not a terminal run status", status.as_str()),
            ));
        }
        let run = self.get_run(run_id)?;
        if run.status != RunStatus::Running {
            return Err(Error::conflict(format!(
                "run {} cannot finalize from status '{}'",
                run_id,
                run.status.as_str()
            )));
        }
        let conn = self.conn.lock().unwrap();
        if status == RunStatus::Completed {
            let pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM responses WHERE run_id=?1 AND status=?2",
                params![run_id, ResponseStatus::Pending.as_str()],
                |r| r.get(0),
            )?;
            if pending > 0 {
                return Err(Error::conflict(format!(
                    "run {} has {} pending responses",
                    run_id, pending
                )));
            }
        }
        conn.execute(
            "UPDATE runs SET status=?1, aggregates_json=?2, completed_at=?3 WHERE id=?4",
            params![
                status.as_str(),
                serde_json::to_string(aggregates)?,
                now_rfc3339(),
                run_id
            ],
        )?;
        Ok(())
    }

    // --- responses ---

    pub fn insert_response(&self, new: &NewResponse) -> Result<ModelResponse> {
        let id = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO responses(run_id, agent_type, question_id, model, answer, confidence, response_time_ms, cost, status, grading_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.run_id,
                    new.agent_type,
                    new.question_id,
                    new.model,
                    new.answer,
                    new.confidence,
                    new.response_time_ms.map(|v| v as i64),
                    new.cost,
                    new.status.as_str(),
                    serde_json::to_string(&new.grading)?,
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_response(id)
    }

    pub fn get_response(&self, id: i64) -> Result<ModelResponse> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, run_id, agent_type, question_id, model, answer, confidence, response_time_ms, cost, status, grading_json, version
             FROM responses WHERE id=?1",
        )?;
        let resp = stmt.query_row(params![id], response_from_row).optional()?;
        resp.ok_or_else(|| Error::not_found("response", id))
    }

    pub fn list_responses_for_run(&self, run_id: i64) -> Result<Vec<ModelResponse>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, run_id, agent_type, question_id, model, answer, confidence, response_time_ms, cost, status, grading_json, version
             FROM responses WHERE run_id=?1 ORDER BY question_id ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![run_id], response_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn list_responses_for_agent(&self, agent_type: &str) -> Result<Vec<ModelResponse>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, run_id, agent_type, question_id, model, answer, confidence, response_time_ms, cost, status, grading_json, version
             FROM responses WHERE agent_type=?1 ORDER BY question_id ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![agent_type], response_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Replace the grading state of a response as one transaction.
    ///
    /// `expected_version` is the optimistic-concurrency assertion: when
    /// set, a mismatch rejects the write instead of silently clobbering
    /// a concurrent grader. Every accepted write bumps `version`.
    pub fn update_grading(
        &self,
        response_id: i64,
        expected_version: Option<i64>,
        grading: &GradingState,
        new_status: Option<ResponseStatus>,
        history: Option<(&str, f64, serde_json::Value)>,
    ) -> Result<ModelResponse> {
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;

            let found: Option<i64> = tx
                .query_row(
                    "SELECT version FROM responses WHERE id=?1",
                    params![response_id],
                    |r| r.get(0),
                )
                .optional()?;
            let found = found.ok_or_else(|| Error::not_found("response", response_id))?;
            if let Some(expected) = expected_version {
                if expected != found {
                    return Err(Error::StaleVersion {
                        response_id,
                        expected,
                        found,
                    });
                }
            }

            match new_status {
                Some(status) => {
                    tx.execute(
                        "UPDATE responses SET grading_json=?1, status=?2, version=version+1 WHERE id=?3",
                        params![serde_json::to_string(grading)?, status.as_str(), response_id],
                    )?;
                }
                None => {
                    tx.execute(
                        "UPDATE responses SET grading_json=?1, version=version+1 WHERE id=?2",
                        params![serde_json::to_string(grading)?, response_id],
                    )?;
                }
            }

            if let Some((source, grade, payload)) = history {
                tx.execute(
                    "INSERT INTO grade_history(response_id, source, grade, payload_json, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        response_id,
                        source,
                        grade,
                        serde_json::to_string(&payload)?,
                        now_rfc3339()
                    ],
                )?;
            }

            tx.commit()?;
        }
        self.get_response(response_id)
    }

    /// Status-only update; grading fields stay untouched and the
    /// version token is not consumed.
    pub fn set_response_status(&self, response_id: i64, status: ResponseStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE responses SET status=?1 WHERE id=?2",
            params![status.as_str(), response_id],
        )?;
        if changed == 0 {
            return Err(Error::not_found("response", response_id));
        }
        Ok(())
    }

    pub fn list_grade_history(&self, response_id: i64) -> Result<Vec<GradeHistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, response_id, source, grade, payload_json, recorded_at
             FROM grade_history WHERE response_id=?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![response_id], |row| {
            let payload_str: String = row.get(4)?;
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                payload_str,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, response_id, source, grade, payload_str, recorded_at) = r?;
            out.push(GradeHistoryEntry {
                id,
                response_id,
                source,
                grade,
                payload: serde_json::from_str(&payload_str)?,
                recorded_at,
            });
        }
        Ok(out)
    }

    // --- grader cache ---

    pub fn grader_cache_get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload_json FROM grader_cache WHERE key=?1")?;
        let payload: Option<String> = stmt
            .query_row(params![key], |r| r.get(0))
            .optional()?;
        match payload {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub fn grader_cache_put(
        &self,
        key: &str,
        provider: &str,
        model: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO grader_cache(key, provider, model, payload_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET payload_json=excluded.payload_json, created_at=excluded.created_at",
            params![
                key,
                provider,
                model,
                serde_json::to_string(payload)?,
                now_rfc3339()
            ],
        )?;
        Ok(())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn question_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BaselineQuestion> {
    let difficulty: String = row.get(4)?;
    let tags_json: String = row.get(6)?;
    Ok(BaselineQuestion {
        id: row.get(0)?,
        question: row.get(1)?,
        expected_answer: row.get(2)?,
        category: row.get(3)?,
        difficulty: Difficulty::parse(&difficulty).unwrap_or(Difficulty::Basic),
        state: row.get(5)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        archived: row.get(7)?,
        last_updated: row.get(8)?,
    })
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BaselineTestRun> {
    let status: String = row.get(8)?;
    let aggregates_json: Option<String> = row.get(9)?;
    Ok(BaselineTestRun {
        id: row.get(0)?,
        config: RunConfig {
            agent_type: row.get(1)?,
            model: row.get(2)?,
            state: row.get(3)?,
            rag_enabled: row.get(4)?,
            tools_enabled: row.get(5)?,
            kb_enabled: row.get(6)?,
            custom_prompt: row.get(7)?,
        },
        status: RunStatus::parse(&status),
        aggregates: aggregates_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(10)?,
        completed_at: row.get(11)?,
    })
}

fn response_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelResponse> {
    let status: String = row.get(9)?;
    let grading_json: String = row.get(10)?;
    Ok(ModelResponse {
        id: row.get(0)?,
        run_id: row.get(1)?,
        agent_type: row.get(2)?,
        question_id: row.get(3)?,
        model: row.get(4)?,
        answer: row.get(5)?,
        confidence: row.get(6)?,
        response_time_ms: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
        cost: row.get(8)?,
        status: ResponseStatus::parse(&status),
        grading: serde_json::from_str(&grading_json).unwrap_or_default(),
        version: row.get(11)?,
    })
}
