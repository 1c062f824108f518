//! Compose executor and deployment pipeline tests

use std::time::Duration;

use webhook_deployer::deploy::executor::{ComposeCommand, ComposeExecutor, Phase};
use webhook_deployer::deploy::fsm::{RequestEvent, RequestFsm, RequestStage};
use webhook_deployer::errors::DeployerError;
use webhook_deployer::models::deployment::DeploymentRequest;

use crate::support::{deployer, FakeCompose};

fn validated_fsm() -> RequestFsm {
    let mut fsm = RequestFsm::new();
    fsm.process(RequestEvent::SignatureVerified).unwrap();
    fsm.process(RequestEvent::PayloadAccepted).unwrap();
    fsm
}

#[tokio::test]
async fn test_execute_runs_pull_then_start() {
    let compose = FakeCompose::new(0, 0);
    let workdir = tempfile::tempdir().unwrap();
    let descriptor = workdir.path().join("docker-compose.yml");

    let executor = ComposeExecutor::new(compose.command());
    let outcome = executor
        .execute(&descriptor, workdir.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(outcome.succeeded);
    assert_eq!(outcome.phase, Phase::Start);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.stdout.trim(), "started");

    let calls = compose.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], format!("-f {} pull", descriptor.display()));
    assert_eq!(
        calls[1],
        format!("-f {} up -d --remove-orphans", descriptor.display())
    );
}

#[tokio::test]
async fn test_execute_short_circuits_on_pull_failure() {
    let compose = FakeCompose::new(1, 0);
    let workdir = tempfile::tempdir().unwrap();
    let descriptor = workdir.path().join("docker-compose.yml");

    let executor = ComposeExecutor::new(compose.command());
    let outcome = executor
        .execute(&descriptor, workdir.path(), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.phase, Phase::Pull);
    assert_eq!(outcome.exit_code, Some(1));
    assert_eq!(outcome.stdout.trim(), "pulling images");
    assert_eq!(outcome.stderr.trim(), "pull diagnostics");
    assert_eq!(compose.calls().len(), 1);
}

#[tokio::test]
async fn test_execute_times_out() {
    let compose = FakeCompose::hanging();
    let workdir = tempfile::tempdir().unwrap();
    let descriptor = workdir.path().join("docker-compose.yml");

    let executor = ComposeExecutor::new(compose.command());
    let err = executor
        .execute(&descriptor, workdir.path(), Duration::from_millis(200))
        .await
        .unwrap_err();

    match err {
        DeployerError::Timeout { phase, timeout } => {
            assert_eq!(phase, Phase::Pull);
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(compose.calls().len(), 1);
}

#[tokio::test]
async fn test_execute_reports_launch_failure() {
    let workdir = tempfile::tempdir().unwrap();
    let executor = ComposeExecutor::new(ComposeCommand::new(
        "/nonexistent/compose-binary",
        Vec::new(),
    ));

    let err = executor
        .execute(
            &workdir.path().join("docker-compose.yml"),
            workdir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployerError::ExecutionError {
            phase: Phase::Pull,
            ..
        }
    ));
}

#[tokio::test]
async fn test_pipeline_deploys_template() {
    let compose = FakeCompose::new(0, 0);
    let root = tempfile::tempdir().unwrap();
    let deployer = deployer(root.path(), compose.command(), Duration::from_secs(5));
    let request =
        DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v1.2.3"}"#).unwrap();

    let mut fsm = validated_fsm();
    let report = deployer.deploy(&request, &mut fsm).await.unwrap();

    assert_eq!(fsm.stage(), RequestStage::StartDone);
    assert_eq!(report.port, Some(2001));
    assert_eq!(
        report.descriptor_path,
        root.path().join("acme/widgets/docker-compose.yml")
    );
    assert!(report.outcome.succeeded);

    let descriptor = std::fs::read_to_string(&report.descriptor_path).unwrap();
    assert!(descriptor.contains("image: registry/acme/widgets:v1.2.3"));
    assert!(descriptor.contains("\"2001:5000\""));
    assert!(root.path().join("acme/widgets/.env").is_file());
    assert!(root.path().join("acme/widgets/data").is_dir());
}

#[tokio::test]
async fn test_pipeline_start_failure_is_phase_failed() {
    let compose = FakeCompose::new(0, 3);
    let root = tempfile::tempdir().unwrap();
    let deployer = deployer(root.path(), compose.command(), Duration::from_secs(5));
    let request = DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v1"}"#).unwrap();

    let mut fsm = validated_fsm();
    let err = deployer.deploy(&request, &mut fsm).await.unwrap_err();

    match err {
        DeployerError::PhaseFailed(outcome) => {
            assert_eq!(outcome.phase, Phase::Start);
            assert_eq!(outcome.exit_code, Some(3));
            assert_eq!(outcome.stderr.trim(), "up diagnostics");
        }
        other => panic!("expected phase failure, got {other:?}"),
    }
    assert_eq!(fsm.stage(), RequestStage::PullDone);
    assert_eq!(compose.calls().len(), 2);
}

#[tokio::test]
async fn test_pipeline_serialises_same_repository() {
    let compose = FakeCompose::new(0, 0);
    let root = tempfile::tempdir().unwrap();
    let deployer = deployer(root.path(), compose.command(), Duration::from_secs(5));
    let first = DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v1"}"#).unwrap();
    let second = DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v2"}"#).unwrap();

    let mut fsm_a = validated_fsm();
    let mut fsm_b = validated_fsm();
    let (a, b) = tokio::join!(
        deployer.deploy(&first, &mut fsm_a),
        deployer.deploy(&second, &mut fsm_b)
    );

    assert_eq!(a.unwrap().port, Some(2001));
    assert_eq!(b.unwrap().port, Some(2001));

    // Phases of one deployment never interleave with the other's
    let calls = compose.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].ends_with(" pull"));
    assert!(calls[1].ends_with(" up -d --remove-orphans"));
    assert!(calls[2].ends_with(" pull"));
    assert!(calls[3].ends_with(" up -d --remove-orphans"));
}

#[tokio::test]
async fn test_pipeline_concurrent_new_repositories_get_distinct_ports() {
    let compose = FakeCompose::new(0, 0);
    let root = tempfile::tempdir().unwrap();
    let deployer = deployer(root.path(), compose.command(), Duration::from_secs(5));
    let gadgets = DeploymentRequest::from_body(br#"{"repo":"acme/gadgets","tag":"v1"}"#).unwrap();
    let widgets = DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v1"}"#).unwrap();

    let mut fsm_a = validated_fsm();
    let mut fsm_b = validated_fsm();
    let (a, b) = tokio::join!(
        deployer.deploy(&gadgets, &mut fsm_a),
        deployer.deploy(&widgets, &mut fsm_b)
    );

    assert_ne!(a.unwrap().port, b.unwrap().port);
}

#[tokio::test]
async fn test_pipeline_pull_failure_stops_before_start() {
    let compose = FakeCompose::new(1, 0);
    let root = tempfile::tempdir().unwrap();
    let deployer = deployer(root.path(), compose.command(), Duration::from_secs(5));
    let request = DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v1"}"#).unwrap();

    let mut fsm = validated_fsm();
    let err = deployer.deploy(&request, &mut fsm).await.unwrap_err();

    assert!(matches!(
        err,
        DeployerError::PhaseFailed(ref outcome) if outcome.phase == Phase::Pull
    ));
    assert_eq!(fsm.stage(), RequestStage::DescriptorReady);
    assert_eq!(compose.calls().len(), 1);
}

#[tokio::test]
async fn test_pipeline_pull_timeout_stops_before_start() {
    let compose = FakeCompose::hanging();
    let root = tempfile::tempdir().unwrap();
    let deployer = deployer(root.path(), compose.command(), Duration::from_millis(200));
    let request = DeploymentRequest::from_body(br#"{"repo":"acme/widgets","tag":"v1"}"#).unwrap();

    let mut fsm = validated_fsm();
    let err = deployer.deploy(&request, &mut fsm).await.unwrap_err();

    assert!(matches!(
        err,
        DeployerError::Timeout {
            phase: Phase::Pull,
            ..
        }
    ));
    assert_eq!(fsm.stage(), RequestStage::DescriptorReady);
}
