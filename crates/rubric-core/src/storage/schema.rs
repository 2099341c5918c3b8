pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
  agent_type TEXT NOT NULL,
  id INTEGER NOT NULL,
  question TEXT NOT NULL,
  expected_answer TEXT NOT NULL,
  category TEXT NOT NULL,
  difficulty TEXT NOT NULL,
  state TEXT,
  tags_json TEXT NOT NULL DEFAULT '[]',
  archived INTEGER NOT NULL DEFAULT 0,
  last_updated TEXT NOT NULL,
  PRIMARY KEY (agent_type, id)
);

CREATE TABLE IF NOT EXISTS runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  agent_type TEXT NOT NULL,
  model TEXT NOT NULL,
  state TEXT,
  rag_enabled INTEGER NOT NULL DEFAULT 0,
  tools_enabled INTEGER NOT NULL DEFAULT 0,
  kb_enabled INTEGER NOT NULL DEFAULT 0,
  custom_prompt TEXT,
  status TEXT NOT NULL,
  aggregates_json TEXT,
  created_at TEXT NOT NULL,
  completed_at TEXT
);

CREATE TABLE IF NOT EXISTS responses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id INTEGER REFERENCES runs(id),
  agent_type TEXT NOT NULL,
  question_id INTEGER NOT NULL,
  model TEXT NOT NULL,
  answer TEXT NOT NULL,
  confidence REAL NOT NULL DEFAULT 0,
  response_time_ms INTEGER,
  cost REAL,
  status TEXT NOT NULL,
  grading_json TEXT NOT NULL,
  version INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_responses_run ON responses(run_id);
CREATE INDEX IF NOT EXISTS idx_responses_question ON responses(agent_type, question_id);

CREATE TABLE IF NOT EXISTS grade_history (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  response_id INTEGER NOT NULL REFERENCES responses(id),
  source TEXT NOT NULL,
  grade REAL NOT NULL,
  payload_json TEXT NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS grader_cache (
  key TEXT PRIMARY KEY,
  provider TEXT NOT NULL,
  model TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#;
