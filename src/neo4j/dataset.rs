//! The records the backup/restore scenario writes and checks for.

use crate::ensure_that;
use crate::error::{HarnessError, Result};
use crate::probe::DatabaseProbe;
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};

pub const DATABASE: &str = "neo4j";
pub const SYSTEM_DATABASE: &str = "system";

const INITIAL_DATA: &str = "CREATE (arne:dog {name:'Arne'})-[:SNIFFS]->(bosse:dog {name:'Bosse'})";
const VERIFY_INITIAL: &str = "MATCH (a:dog)-[:SNIFFS]->(b:dog) RETURN a.name, b.name";
const MORE_DATA: &str = "CREATE (lassie:dog {name:'Lassie'})";
const VERIFY_MORE: &str = "MATCH (l:dog {name:'Lassie'}) RETURN l.name";

pub fn put_initial_data(probe: &dyn DatabaseProbe) -> Result<()> {
    probe.run_query(INITIAL_DATA, DATABASE)?;
    Ok(())
}

pub fn verify_initial_data(probe: &dyn DatabaseProbe) -> Result<()> {
    let rows = probe.run_query(VERIFY_INITIAL, DATABASE)?;
    ensure_that!(
        rows == vec![vec![json!("Arne"), json!("Bosse")]],
        "expected the initial Arne -> Bosse record, got {:?}",
        rows
    );
    Ok(())
}

pub fn put_more_data(probe: &dyn DatabaseProbe) -> Result<()> {
    probe.run_query(MORE_DATA, DATABASE)?;
    Ok(())
}

pub fn verify_more_data(probe: &dyn DatabaseProbe, expect_present: bool) -> Result<()> {
    let rows = probe.run_query(VERIFY_MORE, DATABASE)?;
    let present = rows.len() == 1;
    ensure_that!(
        present == expect_present,
        "expected the Lassie record to be {}, got {:?}",
        if expect_present { "present" } else { "absent" },
        rows
    );
    Ok(())
}

pub fn stop_database(probe: &dyn DatabaseProbe) -> Result<()> {
    probe.run_query(&format!("STOP DATABASE {}", DATABASE), SYSTEM_DATABASE)?;
    Ok(())
}

pub fn start_database(probe: &dyn DatabaseProbe) -> Result<()> {
    probe.run_query(&format!("START DATABASE {}", DATABASE), SYSTEM_DATABASE)?;
    Ok(())
}

/// Poll `SHOW DATABASE` until the database reports `status`.
pub fn await_database_status(
    probe: &dyn DatabaseProbe,
    status: &str,
    timeout: Duration,
) -> Result<()> {
    let query = format!(
        "SHOW DATABASE {} YIELD currentStatus RETURN currentStatus",
        DATABASE
    );
    let deadline = Instant::now() + timeout;
    let mut last = String::from("unknown");
    while Instant::now() < deadline {
        let rows = probe.run_query(&query, SYSTEM_DATABASE)?;
        if let Some(current) = rows.first().and_then(|r| r.first()).and_then(|v| v.as_str()) {
            if current == status {
                return Ok(());
            }
            last = current.to_string();
        }
        thread::sleep(Duration::from_millis(500));
    }
    Err(HarnessError::AssertionFailure(format!(
        "database '{}' still '{}' after {:?}, expected '{}'",
        DATABASE, last, timeout, status
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeError, QueryRows};
    use parking_lot::Mutex;

    /// Answers queries from a fixed script and records what was asked.
    struct ScriptedProbe {
        answers: Mutex<Vec<QueryRows>>,
        asked: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedProbe {
        fn new(answers: Vec<QueryRows>) -> Self {
            Self {
                answers: Mutex::new(answers),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl DatabaseProbe for ScriptedProbe {
        fn run_query(&self, statement: &str, database: &str) -> std::result::Result<QueryRows, ProbeError> {
            self.asked
                .lock()
                .push((statement.to_string(), database.to_string()));
            let mut answers = self.answers.lock();
            if answers.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(answers.remove(0))
            }
        }

        fn verify_connectivity(&self) -> std::result::Result<(), ProbeError> {
            Ok(())
        }
    }

    #[test]
    fn test_verify_initial_data() {
        let probe = ScriptedProbe::new(vec![vec![vec![json!("Arne"), json!("Bosse")]]]);
        assert!(verify_initial_data(&probe).is_ok());

        let probe = ScriptedProbe::new(vec![vec![]]);
        let err = verify_initial_data(&probe).unwrap_err();
        assert!(matches!(err, HarnessError::AssertionFailure(_)));
    }

    #[test]
    fn test_verify_more_data_presence_and_absence() {
        let present = ScriptedProbe::new(vec![vec![vec![json!("Lassie")]]]);
        assert!(verify_more_data(&present, true).is_ok());
        let present = ScriptedProbe::new(vec![vec![vec![json!("Lassie")]]]);
        assert!(verify_more_data(&present, false).is_err());

        let absent = ScriptedProbe::new(vec![vec![]]);
        assert!(verify_more_data(&absent, false).is_ok());
    }

    #[test]
    fn test_admin_statements_go_to_system_database() {
        let probe = ScriptedProbe::new(vec![]);
        stop_database(&probe).unwrap();
        start_database(&probe).unwrap();
        let asked = probe.asked.lock();
        assert_eq!(asked[0], ("STOP DATABASE neo4j".to_string(), "system".to_string()));
        assert_eq!(asked[1], ("START DATABASE neo4j".to_string(), "system".to_string()));
    }

    #[test]
    fn test_await_database_status() {
        let probe = ScriptedProbe::new(vec![
            vec![vec![json!("starting")]],
            vec![vec![json!("online")]],
        ]);
        assert!(await_database_status(&probe, "online", Duration::from_secs(5)).is_ok());
    }
}
