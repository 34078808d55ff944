//! Integration tests for the package inventory queries

use devbox::parallel::{Ecosystem, EngineConfig, PackageQueryExecutor, PACKAGE_QUERIES};
use devbox::testing::ScriptedRunner;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn query_command(ecosystem: Ecosystem) -> &'static str {
    PACKAGE_QUERIES
        .iter()
        .find(|query| query.ecosystem == ecosystem)
        .map(|query| query.command)
        .unwrap()
}

fn healthy_box() -> devbox::testing::ScriptedRunnerBuilder {
    ScriptedRunner::builder()
        .with_success(query_command(Ecosystem::Apt), "curl=7.88.1\ngit=1:2.39.2\n")
        .with_success(query_command(Ecosystem::Pip), "flask==3.0.0\n")
        .with_success(
            query_command(Ecosystem::Npm),
            r#"{"dependencies": {"typescript": {"version": "5.3.3"}}}"#,
        )
        .with_success(query_command(Ecosystem::Yarn), "webpack@5.89.0\n")
        .with_success(
            query_command(Ecosystem::Pnpm),
            r#"[{"dependencies": {"zx": {"version": "7.2.3"}}}]"#,
        )
}

#[tokio::test]
async fn test_all_ecosystems_reported() {
    let runner = Arc::new(healthy_box().build());
    let executor = PackageQueryExecutor::new("test-box", runner.clone(), &EngineConfig::default());

    let inventory = executor.query_all_packages().await;

    assert_eq!(inventory[&Ecosystem::Apt], vec!["curl=7.88.1", "git=1:2.39.2"]);
    assert_eq!(inventory[&Ecosystem::Pip], vec!["flask==3.0.0"]);
    assert_eq!(inventory[&Ecosystem::Npm], vec!["typescript@5.3.3"]);
    assert_eq!(inventory[&Ecosystem::Yarn], vec!["webpack@5.89.0"]);
    assert_eq!(inventory[&Ecosystem::Pnpm], vec!["zx@7.2.3"]);
    assert_eq!(runner.calls().len(), 5);
}

#[tokio::test]
async fn test_failed_query_leaves_empty_entry() {
    let runner = Arc::new(
        healthy_box()
            .with_error(query_command(Ecosystem::Pip), "pip: command not found", 127)
            .build(),
    );
    let executor = PackageQueryExecutor::new("test-box", runner, &EngineConfig::default());

    let inventory = executor.query_all_packages().await;

    assert_eq!(inventory.len(), 5);
    assert!(inventory[&Ecosystem::Pip].is_empty());
    assert_eq!(inventory[&Ecosystem::Apt].len(), 2);
    assert_eq!(inventory[&Ecosystem::Npm].len(), 1);
    assert_eq!(inventory[&Ecosystem::Yarn].len(), 1);
    assert_eq!(inventory[&Ecosystem::Pnpm].len(), 1);
}

#[tokio::test]
async fn test_unreachable_box_yields_empty_inventory() {
    let mut builder = ScriptedRunner::builder();
    for query in &PACKAGE_QUERIES {
        builder = builder.with_unavailable(query.command);
    }
    let executor =
        PackageQueryExecutor::new("gone-box", Arc::new(builder.build()), &EngineConfig::default());

    let inventory = executor.query_all_packages().await;

    assert_eq!(inventory.len(), 5);
    assert!(inventory.values().all(Vec::is_empty));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_query_times_out_alone() {
    let runner = Arc::new(
        healthy_box()
            .with_delay(query_command(Ecosystem::Yarn), Duration::from_secs(5))
            .build(),
    );
    let config = EngineConfig {
        query_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let executor = PackageQueryExecutor::new("test-box", runner, &config);

    let start = Instant::now();
    let inventory = executor.query_all_packages().await;

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(inventory[&Ecosystem::Yarn].is_empty());
    assert_eq!(inventory[&Ecosystem::Pip], vec!["flask==3.0.0"]);
}

#[tokio::test]
async fn test_sequential_queries_match_parallel_results() {
    let runner = Arc::new(
        healthy_box()
            .with_error(query_command(Ecosystem::Npm), "", 1)
            .build(),
    );
    let executor = PackageQueryExecutor::new("test-box", runner.clone(), &EngineConfig::default());

    let parallel = executor.query_all_packages().await;
    let sequential = executor.query_all_sequential().await;

    assert_eq!(parallel, sequential);
    assert!(sequential[&Ecosystem::Npm].is_empty());
    assert_eq!(runner.calls().len(), 10);
}
