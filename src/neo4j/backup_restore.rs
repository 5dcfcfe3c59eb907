use super::admin::AdminCommand;
use super::dataset::{self, DATABASE};
use super::settings::ServerSettings;
use crate::config::{Edition, HarnessConfig};
use crate::ensure_that;
use crate::error::{HarnessError, Result};
use crate::hostfs::ScenarioDirs;
use crate::probe::{Credentials, DatabaseProbe, Neo4jHttpProbe};
use crate::readiness::Readiness;
use crate::sandbox::SandboxSpec;
use crate::scenario::{Scenario, ScenarioContext};
use std::fmt;
use std::time::Duration;

const SERVER: &str = "neo4j";
const BACKUP_ADMIN: &str = "admin-backup";
const RESTORE_ADMIN: &str = "admin-restore";
const DB_USER: &str = "neo4j";
const BACKUP_PORT: u16 = 6362;
const BOLT_PORT: u16 = 7687;
const HTTP_PORT: u16 = 7474;

const BACKUP_DONE: &str = "^Backup complete successful.*";
const RESTORE_DONE: &str = "^.*restoreStatus=successful.*";

/// One combination of the backup/restore matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRestoreCase {
    /// Run sandboxes as the image's own user instead of the invoking user.
    pub as_default_user: bool,
    /// `none` disables authentication.
    pub password: String,
}

impl BackupRestoreCase {
    pub fn new(as_default_user: bool, password: &str) -> Self {
        Self {
            as_default_user,
            password: password.to_string(),
        }
    }

    /// defaultUser/noAuth, nonDefaultUser/noAuth, defaultUser/withAuth, nonDefaultUser/withAuth
    pub fn matrix() -> Vec<Self> {
        vec![
            Self::new(true, "none"),
            Self::new(false, "none"),
            Self::new(true, "secretpassword"),
            Self::new(false, "secretpassword"),
        ]
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::from_password(DB_USER, &self.password)
    }

    pub fn name(&self) -> String {
        let user = if self.as_default_user { "defaultUser" } else { "nonDefaultUser" };
        let auth = if self.password.eq_ignore_ascii_case("none") { "noAuth" } else { "withAuth" };
        format!("backupRestore_{}_{}", user, auth)
    }

    fn user(&self) -> Option<String> {
        (!self.as_default_user).then(current_user)
    }
}

impl fmt::Display for BackupRestoreCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// `uid:gid` of the invoking user, so files written to mounts stay readable by it.
pub fn current_user() -> String {
    format!("{}:{}", nix::unistd::getuid(), nix::unistd::getgid())
}

pub fn ensure_enterprise(config: &HarnessConfig) -> Result<()> {
    if config.images.edition != Edition::Enterprise {
        return Err(HarnessError::Config(
            "backup and restore are only available in the enterprise edition".to_string(),
        ));
    }
    Ok(())
}

pub fn server_spec(config: &HarnessConfig, case: &BackupRestoreCase) -> SandboxSpec {
    let settings = ServerSettings::new()
        .auth(&case.credentials())
        .accept_license()
        .set("dbms.backup.enabled", "true")
        .set("dbms.backup.listen_address", &format!("0.0.0.0:{}", BACKUP_PORT));

    let spec = SandboxSpec::new(SERVER, &config.images.server)
        .with_envs(settings.to_env())
        .with_exposed_ports(&[HTTP_PORT, BOLT_PORT, BACKUP_PORT])
        .waiting_for(Readiness::http(HTTP_PORT, "/", 200, config.timeouts.startup()));
    match case.user() {
        Some(user) => spec.with_user(&user),
        None => spec,
    }
}

pub fn admin_spec(
    config: &HarnessConfig,
    case: &BackupRestoreCase,
    name: &str,
    command: &AdminCommand,
    done: &str,
) -> Result<SandboxSpec> {
    let spec = SandboxSpec::new(name, &config.images.admin)
        .with_envs(ServerSettings::new().accept_license().to_env())
        .with_command(command.to_args())
        .waiting_for(Readiness::log_pattern(done, config.timeouts.admin())?);
    Ok(match case.user() {
        Some(user) => spec.with_user(&user),
        None => spec,
    })
}

fn probe(ctx: &ScenarioContext, case: &BackupRestoreCase, timeout: Duration) -> Result<Neo4jHttpProbe> {
    Neo4jHttpProbe::for_handle(ctx.handle(SERVER)?, case.credentials(), timeout)
}

/// Back up a populated database, write more, restore, and check that only
/// the data present at backup time survived.
pub fn backup_restore_scenario(
    config: &HarnessConfig,
    case: &BackupRestoreCase,
    dirs: ScenarioDirs,
) -> Scenario {
    let probe_timeout = config.timeouts.probe();
    let startup_timeout = config.timeouts.startup();

    let (cfg, c) = (config.clone(), case.clone());
    let start_server = move |ctx: &mut ScenarioContext| -> Result<()> {
        let (spec, data_dir) = ctx
            .dirs()?
            .create_and_mount(server_spec(&cfg, &c), "data-", "/data")?;
        ctx.remember_dir("data", &data_dir);
        ctx.start(spec)?;
        Ok(())
    };

    let c = case.clone();
    let initial_data = move |ctx: &mut ScenarioContext| -> Result<()> {
        let db = probe(ctx, &c, probe_timeout)?;
        dataset::put_initial_data(&db)?;
        dataset::verify_initial_data(&db)
    };

    let (cfg, c) = (config.clone(), case.clone());
    let backup = move |ctx: &mut ScenarioContext| -> Result<()> {
        let command = AdminCommand::backup(DATABASE, "/backup");
        let spec = admin_spec(&cfg, &c, BACKUP_ADMIN, &command, BACKUP_DONE)?
            .with_network_of(ctx.handle(SERVER)?);
        let (spec, backup_dir) = ctx.dirs()?.create_and_mount(spec, "backup-", "/backup")?;
        ctx.remember_dir("backup", &backup_dir);
        ctx.start(spec)?;

        ensure_that!(
            ctx.handle(SERVER)?.is_running(),
            "{} should still be running after the backup",
            SERVER
        );
        dataset::verify_initial_data(&probe(ctx, &c, probe_timeout)?)?;
        ctx.stop(BACKUP_ADMIN)
    };

    let c = case.clone();
    let more_data = move |ctx: &mut ScenarioContext| -> Result<()> {
        let db = probe(ctx, &c, probe_timeout)?;
        dataset::put_more_data(&db)?;
        dataset::verify_more_data(&db, true)
    };

    let c = case.clone();
    let stop_database = move |ctx: &mut ScenarioContext| -> Result<()> {
        dataset::stop_database(&probe(ctx, &c, probe_timeout)?)
    };

    let (cfg, c) = (config.clone(), case.clone());
    let restore = move |ctx: &mut ScenarioContext| -> Result<()> {
        let command = AdminCommand::restore(DATABASE, "/backup/neo4j", true);
        let spec = admin_spec(&cfg, &c, RESTORE_ADMIN, &command, RESTORE_DONE)?
            .with_mount(ctx.dir("backup")?, "/backup")
            .with_mount(ctx.dir("data")?, "/data");
        ctx.start(spec)?;
        ctx.stop(RESTORE_ADMIN)
    };

    let c = case.clone();
    let start_database = move |ctx: &mut ScenarioContext| -> Result<()> {
        let db = probe(ctx, &c, probe_timeout)?;
        dataset::start_database(&db)?;
        dataset::await_database_status(&db, "online", startup_timeout)
    };

    let c = case.clone();
    let verify_restored = move |ctx: &mut ScenarioContext| -> Result<()> {
        let db = probe(ctx, &c, probe_timeout)?;
        db.verify_connectivity()?;
        dataset::verify_more_data(&db, false)?;
        dataset::verify_initial_data(&db)
    };

    Scenario::new(&case.name(), config.runtime())
        .with_dirs(dirs)
        .phase("start server", start_server)
        .phase("write initial data", initial_data)
        .phase("backup", backup)
        .phase("write more data", more_data)
        .phase("stop database", stop_database)
        .phase("restore", restore)
        .phase("start database", start_database)
        .phase("verify restored data", verify_restored)
}
