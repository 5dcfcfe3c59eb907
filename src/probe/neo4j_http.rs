use super::{Credentials, DatabaseProbe, ProbeError, QueryRows};
use crate::error::Result as HarnessResult;
use crate::sandbox::SandboxHandle;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP port the server image listens on for the transactional endpoint.
pub const HTTP_PORT: u16 = 7474;

pub struct Neo4jHttpProbe {
    pub base_url: String,
    pub credentials: Credentials,
    client: reqwest::blocking::Client,
}

// --- Transactional endpoint request/response types ---

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
}

#[derive(Deserialize, Debug)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<StatementError>,
}

#[derive(Deserialize, Debug)]
struct StatementResult {
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Deserialize, Debug)]
struct ResultRow {
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct StatementError {
    code: String,
    message: String,
}

// --- Implementation ---

impl Neo4jHttpProbe {
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }

    /// Probe the server running in `handle`, through its published HTTP port.
    pub fn for_handle(
        handle: &SandboxHandle,
        credentials: Credentials,
        timeout: Duration,
    ) -> HarnessResult<Self> {
        let addr = handle.resolve_port(HTTP_PORT)?;
        Ok(Self::new(&format!("http://{}", addr), credentials, timeout))
    }

    fn commit_url(&self, database: &str) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, database)
    }
}

impl DatabaseProbe for Neo4jHttpProbe {
    fn run_query(&self, statement: &str, database: &str) -> Result<QueryRows, ProbeError> {
        let request = CommitRequest {
            statements: vec![Statement { statement }],
        };

        let mut builder = self
            .client
            .post(self.commit_url(database))
            .header("Accept", "application/json;charset=UTF-8")
            .json(&request);
        if let Some(password) = &self.credentials.password {
            builder = builder.basic_auth(&self.credentials.user, Some(password));
        }

        tracing::debug!(database, statement, "running query");
        let response = builder
            .send()
            .map_err(|e| ProbeError::Connection(format!("{}: {}", self.base_url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ProbeError::Connection(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(ProbeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_commit_response(&body)
    }

    fn verify_connectivity(&self) -> Result<(), ProbeError> {
        let rows = self.run_query("RETURN 1", "system")?;
        if rows.len() == 1 {
            Ok(())
        } else {
            Err(ProbeError::Parse(format!(
                "expected one row from connectivity check, got {}",
                rows.len()
            )))
        }
    }
}

fn parse_commit_response(body: &str) -> Result<QueryRows, ProbeError> {
    let parsed: CommitResponse =
        serde_json::from_str(body).map_err(|e| ProbeError::Parse(e.to_string()))?;

    if let Some(err) = parsed.errors.into_iter().next() {
        return Err(ProbeError::Database {
            code: err.code,
            message: err.message,
        });
    }

    Ok(parsed
        .results
        .into_iter()
        .flat_map(|r| r.data.into_iter().map(|d| d.row))
        .collect())
}
