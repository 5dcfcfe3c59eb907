mod common;

use common::RecordingRuntime;
use sandbox_harness::sandbox::{NetworkMode, SandboxHandle, SandboxId, SandboxSpec, SandboxState};
use sandbox_harness::{HarnessError, Readiness};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_stop_twice_stops_once() {
    let runtime = Arc::new(RecordingRuntime::new());
    let mut handle = SandboxHandle::launch(runtime.clone(), SandboxSpec::new("db", "neo4j")).unwrap();
    assert_eq!(handle.state(), SandboxState::Ready);

    handle.stop().unwrap();
    handle.stop().unwrap();
    drop(handle);

    assert_eq!(runtime.stop_count("db"), 1);
    assert!(runtime.running().is_empty());
}

#[test]
fn test_drop_stops_started_sandbox() {
    let runtime = Arc::new(RecordingRuntime::new());
    {
        let _handle = SandboxHandle::launch(runtime.clone(), SandboxSpec::new("db", "neo4j")).unwrap();
        assert_eq!(runtime.running(), vec!["db"]);
    }
    assert_eq!(runtime.events(), vec!["start:db", "stop:db"]);
}

#[test]
fn test_unstarted_handle_is_never_stopped() {
    let runtime = Arc::new(RecordingRuntime::new());
    let mut handle = SandboxHandle::new(runtime.clone(), SandboxSpec::new("db", "neo4j"));
    handle.stop().unwrap();
    drop(handle);
    assert!(runtime.events().is_empty());
}

#[test]
fn test_network_share_with_stopped_target_is_rejected() {
    let runtime = Arc::new(RecordingRuntime::new());
    let mut spec = SandboxSpec::new("admin", "neo4j-admin");
    spec.network = NetworkMode::ShareWith(SandboxId("ghost".to_string()));

    let err = SandboxHandle::launch(runtime.clone(), spec).unwrap_err();
    assert!(matches!(err, HarnessError::LaunchFailure { ref sandbox, .. } if sandbox == "admin"));
    assert!(runtime.events().is_empty());
}

#[test]
fn test_network_share_with_unstarted_target_is_rejected() {
    let runtime = Arc::new(RecordingRuntime::new());
    let server = SandboxHandle::new(runtime.clone(), SandboxSpec::new("db", "neo4j"));
    assert_eq!(server.state(), SandboxState::Created);

    let spec = SandboxSpec::new("admin", "neo4j-admin").with_network_of(&server);
    assert_eq!(spec.network, NetworkMode::ShareWithUnstarted("db".to_string()));

    let err = SandboxHandle::launch(runtime.clone(), spec).unwrap_err();
    assert!(matches!(err, HarnessError::LaunchFailure { ref sandbox, .. } if sandbox == "admin"));
    assert!(err.to_string().contains("never started"));
    assert!(runtime.events().is_empty());
}

#[test]
fn test_network_share_with_stopped_handle_is_rejected() {
    let runtime = Arc::new(RecordingRuntime::new());
    let mut server = SandboxHandle::launch(runtime.clone(), SandboxSpec::new("db", "neo4j")).unwrap();
    server.stop().unwrap();

    let spec = SandboxSpec::new("admin", "neo4j-admin").with_network_of(&server);
    let err = SandboxHandle::launch(runtime.clone(), spec).unwrap_err();
    assert!(matches!(err, HarnessError::LaunchFailure { .. }));
    assert_eq!(runtime.events(), vec!["start:db", "stop:db"]);
}

#[test]
fn test_network_share_with_running_target() {
    let runtime = Arc::new(RecordingRuntime::new());
    let server = SandboxHandle::launch(runtime.clone(), SandboxSpec::new("db", "neo4j")).unwrap();
    let admin = SandboxHandle::launch(
        runtime.clone(),
        SandboxSpec::new("admin", "neo4j-admin").with_network_of(&server),
    )
    .unwrap();
    assert_eq!(admin.spec().network, NetworkMode::ShareWith(SandboxId("db".to_string())));
}

#[test]
fn test_start_twice_is_rejected() {
    let runtime = Arc::new(RecordingRuntime::new());
    let mut handle = SandboxHandle::launch(runtime.clone(), SandboxSpec::new("db", "neo4j")).unwrap();
    let err = handle.start().unwrap_err();
    assert!(matches!(err, HarnessError::LaunchFailure { .. }));
    assert_eq!(runtime.events(), vec!["start:db"]);
}

#[test]
fn test_log_pattern_matches_recorded_line() {
    let runtime = Arc::new(
        RecordingRuntime::new().with_logs("admin", &["noise", "Backup complete successful."]),
    );
    let spec = SandboxSpec::new("admin", "neo4j-admin").waiting_for(
        Readiness::log_pattern("^Backup complete successful.*", Duration::from_secs(1)).unwrap(),
    );
    let mut handle = SandboxHandle::launch(runtime, spec).unwrap();
    assert_eq!(handle.log_tail(), vec!["noise", "Backup complete successful."]);
}

#[test]
fn test_log_pattern_on_closed_stream() {
    let runtime = Arc::new(RecordingRuntime::new().with_logs("admin", &["INFO Backup complete successful."]));
    let spec = SandboxSpec::new("admin", "neo4j-admin").waiting_for(
        Readiness::log_pattern("^Backup complete successful.*", Duration::from_secs(1)).unwrap(),
    );
    let mut handle = SandboxHandle::new(runtime, spec);
    handle.start().unwrap();
    let err = handle.wait_ready().unwrap_err();
    assert!(matches!(err, HarnessError::StreamClosed { .. }));
    assert_eq!(handle.state(), SandboxState::Failed);
    assert_eq!(handle.log_tail(), vec!["INFO Backup complete successful."]);
}

#[test]
fn test_invalid_spec_never_reaches_runtime() {
    let runtime = Arc::new(RecordingRuntime::new());
    let spec = SandboxSpec::new("db", "neo4j").with_mount("/definitely/not/here", "/data");
    assert!(SandboxHandle::launch(runtime.clone(), spec).is_err());
    assert!(runtime.events().is_empty());
}
