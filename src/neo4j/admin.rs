/// One invocation of the administration tool, e.g. `neo4j-admin backup ...`.
///
/// Options keep their insertion order. A `true` flag renders as a bare
/// `--name`, everything else as `--name=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminCommand {
    pub action: String,
    options: Vec<(String, AdminOption)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminOption {
    Value(String),
    Flag(bool),
}

pub const ADMIN_TOOL: &str = "neo4j-admin";

impl AdminCommand {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            options: Vec::new(),
        }
    }

    pub fn backup(database: &str, backup_dir: &str) -> Self {
        Self::new("backup")
            .option("database", database)
            .option("backup-dir", backup_dir)
    }

    pub fn restore(database: &str, from: &str, force: bool) -> Self {
        Self::new("restore")
            .option("database", database)
            .option("from", from)
            .flag("force", force)
    }

    pub fn option(mut self, name: &str, value: &str) -> Self {
        self.options
            .push((name.to_string(), AdminOption::Value(value.to_string())));
        self
    }

    pub fn flag(mut self, name: &str, enabled: bool) -> Self {
        self.options.push((name.to_string(), AdminOption::Flag(enabled)));
        self
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![ADMIN_TOOL.to_string(), self.action.clone()];
        for (name, value) in &self.options {
            match value {
                AdminOption::Value(v) => args.push(format!("--{}={}", name, v)),
                AdminOption::Flag(true) => args.push(format!("--{}", name)),
                AdminOption::Flag(false) => {}
            }
        }
        args
    }
}
