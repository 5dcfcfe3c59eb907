//! Full backup/restore against real server and admin images. Needs a Docker
//! daemon and enterprise images: `cargo test -- --ignored`.

use rstest::rstest;
use sandbox_harness::config::Edition;
use sandbox_harness::neo4j::{backup_restore_scenario, BackupRestoreCase};
use sandbox_harness::{logging, HarnessConfig, ScenarioDirs};

#[rstest]
#[case::default_user_no_auth(true, "none")]
#[case::non_default_user_no_auth(false, "none")]
#[case::default_user_with_auth(true, "secretpassword")]
#[case::non_default_user_with_auth(false, "secretpassword")]
#[ignore] // Requires Docker and enterprise images
fn test_backup_and_restore(#[case] as_default_user: bool, #[case] password: &str) {
    logging::init("info");
    let (config, warnings) = HarnessConfig::load();
    for warning in &warnings {
        eprintln!("warning: {}", warning);
    }
    if config.images.edition != Edition::Enterprise {
        eprintln!("skipping: backup and restore are only available in the enterprise edition");
        return;
    }

    let case = BackupRestoreCase::new(as_default_user, password);
    let dirs = ScenarioDirs::create(
        "backupRestore-",
        config.scenario.temp_root.as_deref(),
        config.scenario.keep_dirs,
    )
    .unwrap();

    match backup_restore_scenario(&config, &case, dirs).run() {
        Ok(report) => println!("{}", report),
        Err(e) => panic!("{}", e),
    }
}
