//! Clients used to observe and mutate the state of a sandboxed service.
//!
//! A probe is a verification oracle: scenarios write through it, read through
//! it and assert on what comes back. It never manages sandbox lifecycle.

pub mod neo4j_http;

use std::fmt;

pub use neo4j_http::Neo4jHttpProbe;

/// Result rows of a query, one `Vec` of column values per row.
pub type QueryRows = Vec<Vec<serde_json::Value>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub user: String,
    /// `None` when the server runs with authentication disabled.
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: &str, password: Option<&str>) -> Self {
        Self {
            user: user.to_string(),
            password: password.map(str::to_string),
        }
    }

    /// Parse the `none` / `<password>` convention used by scenario parameters.
    pub fn from_password(user: &str, password: &str) -> Self {
        if password.eq_ignore_ascii_case("none") {
            Self::new(user, None)
        } else {
            Self::new(user, Some(password))
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.password {
            Some(_) => write!(f, "{}/****", self.user),
            None => write!(f, "{} (no auth)", self.user),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Database error {code}: {message}")]
    Database { code: String, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

pub trait DatabaseProbe {
    fn run_query(&self, statement: &str, database: &str) -> Result<QueryRows, ProbeError>;
    fn verify_connectivity(&self) -> Result<(), ProbeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_password() {
        let none = Credentials::from_password("neo4j", "NONE");
        assert_eq!(none.password, None);
        let secret = Credentials::from_password("neo4j", "secretpassword");
        assert_eq!(secret.password.as_deref(), Some("secretpassword"));
    }

    #[test]
    fn test_credentials_display_hides_password() {
        let creds = Credentials::new("neo4j", Some("hunter2"));
        assert_eq!(creds.to_string(), "neo4j/****");
        assert_eq!(Credentials::new("neo4j", None).to_string(), "neo4j (no auth)");
    }
}
