use crate::probe::Credentials;
use std::collections::BTreeMap;

const ENV_PREFIX: &str = "NEO4J_";

/// Server configuration in its dotted form, rendered as the image's env vars.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSettings {
    settings: BTreeMap<String, String>,
    auth: Option<String>,
    accept_license: bool,
}

/// `dbms.backup.listen_address` -> `NEO4J_dbms_backup_listen__address`
pub fn env_name(setting: &str) -> String {
    format!(
        "{}{}",
        ENV_PREFIX,
        setting.replace('_', "__").replace('.', "_")
    )
}

impl ServerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    /// Disable authentication, or require the given password.
    pub fn auth(mut self, credentials: &Credentials) -> Self {
        self.auth = Some(match &credentials.password {
            Some(password) => format!("{}/{}", credentials.user, password),
            None => "none".to_string(),
        });
        self
    }

    pub fn accept_license(mut self) -> Self {
        self.accept_license = true;
        self
    }

    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .settings
            .iter()
            .map(|(k, v)| (env_name(k), v.clone()))
            .collect();
        if let Some(auth) = &self.auth {
            env.insert("NEO4J_AUTH".to_string(), auth.clone());
        }
        if self.accept_license {
            env.insert("NEO4J_ACCEPT_LICENSE_AGREEMENT".to_string(), "yes".to_string());
        }
        env
    }
}
