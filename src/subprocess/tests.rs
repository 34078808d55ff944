use super::*;
use std::time::Duration;

#[tokio::test]
async fn test_production_runner_success() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::new("echo")
        .arg("hello world")
        .build();

    let output = runner.run(command).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.trim(), "hello world");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_production_runner_failure() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::new("sh")
        .args(["-c", "echo broken >&2; exit 3"])
        .build();

    let output = runner.run(command).await.unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.stderr.trim(), "broken");
}

#[tokio::test]
async fn test_production_runner_command_not_found() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::new("nonexistent-command-12345").build();

    let result = runner.run(command).await;
    assert!(matches!(
        result.unwrap_err(),
        ProcessError::CommandNotFound(_)
    ));
}

#[tokio::test]
async fn test_production_runner_timeout() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::new("sleep")
        .arg("5")
        .timeout(Duration::from_millis(100))
        .build();

    let result = runner.run(command).await;
    assert!(matches!(result.unwrap_err(), ProcessError::Timeout(_)));
}

#[tokio::test]
async fn test_production_runner_passes_env() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::new("sh")
        .args(["-c", "echo $DEVBOX_PROBE"])
        .env("DEVBOX_PROBE", "present")
        .build();

    let output = runner.run(command).await.unwrap();
    assert_eq!(output.stdout.trim(), "present");
}

#[test]
fn test_builder_docker_exec() {
    let command = ProcessCommandBuilder::docker_exec("my-box")
        .bash_script("pip install flask")
        .build();

    assert_eq!(command.program, "docker");
    assert_eq!(
        command.args,
        vec!["exec", "my-box", "bash", "-c", "pip install flask"]
    );
}

#[tokio::test]
async fn test_mock_runner_basic() {
    let mut mock = MockProcessRunner::new();

    mock.expect_command("docker")
        .with_args(|args| args.last().map(String::as_str) == Some("npm ls"))
        .returns_stdout("{}\n")
        .finish();

    let output = mock
        .run(
            ProcessCommandBuilder::docker_exec("box")
                .bash_script("npm ls")
                .build(),
        )
        .await
        .unwrap();

    assert!(output.status.success());
    assert_eq!(output.stdout, "{}\n");
    assert!(mock.verify_called("docker", 1));
}

#[tokio::test]
async fn test_mock_runner_exit_code_and_stderr() {
    let mut mock = MockProcessRunner::new();

    mock.expect_command("docker")
        .returns_exit_code(100)
        .returns_stderr("E: Unable to locate package")
        .finish();

    let output = mock
        .run(ProcessCommandBuilder::docker_exec("box").build())
        .await
        .unwrap();

    assert_eq!(output.status, ExitStatus::Error(100));
    assert_eq!(output.stderr, "E: Unable to locate package");
}

#[tokio::test]
async fn test_mock_runner_times_limit() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("docker").times(1).finish();

    let command = ProcessCommandBuilder::docker_exec("box").build();
    assert!(mock.run(command.clone()).await.is_ok());

    let result = mock.run(command).await;
    assert!(matches!(
        result.unwrap_err(),
        ProcessError::MockExpectationNotMet(_)
    ));
}

#[tokio::test]
async fn test_mock_runner_unmatched_command() {
    let (manager, _mock) = SubprocessManager::mock();

    let result = manager
        .runner()
        .run(ProcessCommandBuilder::new("podman").build())
        .await;

    assert!(matches!(
        result.unwrap_err(),
        ProcessError::MockExpectationNotMet(_)
    ));
}

#[tokio::test]
async fn test_mock_runner_reset_clears_history() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("docker").finish();

    mock.run(ProcessCommandBuilder::docker_exec("box").build())
        .await
        .unwrap();
    assert_eq!(mock.get_call_history().len(), 1);

    mock.reset();
    assert!(mock.get_call_history().is_empty());
    assert!(mock
        .run(ProcessCommandBuilder::docker_exec("box").build())
        .await
        .is_err());
}

#[tokio::test]
async fn test_mock_runner_delayed_response() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("docker")
        .delayed(Duration::from_millis(50))
        .returns_stdout("done")
        .finish();

    let start = std::time::Instant::now();
    let output = mock
        .run(ProcessCommandBuilder::docker_exec("box").build())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(output.stdout, "done");
}
