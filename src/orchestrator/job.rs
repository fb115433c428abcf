use super::upload::Upload;
use crate::parser::ParsedFindings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One analysis request. Lives for the duration of that request only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub tool_id: String,
    pub uploaded_filename: String,
    pub started_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Hex SHA-256 of the uploaded package.
    pub sha256: String,
}

impl Job {
    pub fn new(tool_id: &str, upload: &Upload) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_id: tool_id.to_string(),
            uploaded_filename: upload.filename.clone(),
            started_at: Utc::now(),
            size_bytes: upload.size(),
            sha256: hex::encode(Sha256::digest(&upload.data)),
        }
    }

    /// Name given to the job's container.
    pub fn container_name(&self) -> String {
        format!("apkdock-{}", self.id)
    }
}

/// What a finished container run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    /// False only for the partial-result path after a capture overflow.
    pub completed: bool,
    pub raw_text: String,
}

/// Response body for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub tool: String,
    pub filename: String,
    pub job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    /// Raw result file content.
    pub results: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<ParsedFindings>,
}

impl JobReport {
    pub fn new(job: &Job, outcome: AnalysisOutcome, findings: Option<ParsedFindings>) -> Self {
        Self {
            tool: job.tool_id.clone(),
            filename: job.uploaded_filename.clone(),
            job_id: job.id,
            started_at: job.started_at,
            completed: outcome.completed,
            results: outcome.raw_text,
            findings,
        }
    }
}
