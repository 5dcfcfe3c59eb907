//! Neo4j server and admin-tool sandboxes, and the backup/restore scenario
//! built from them.

pub mod admin;
pub mod backup_restore;
pub mod dataset;
pub mod settings;

pub use admin::AdminCommand;
pub use backup_restore::{backup_restore_scenario, ensure_enterprise, BackupRestoreCase};
pub use settings::ServerSettings;
