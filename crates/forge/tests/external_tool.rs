// Path: crates/forge/tests/external_tool.rs

use anyhow::Result;
use casperlabs_forge::testing::runtime::VolumeHandle;
use casperlabs_forge::testing::{init_test_logging, MockRuntime, PairedProcessManager};
use casperlabs_types::config::{PairConfig, ParsePolicy, StartupStrategy};
use casperlabs_types::error::{ConfigError, PairError};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A stand-in for `make`: echoes the up output and records every target it ran.
const FAKE_MAKE: &str = r#"
echo "$1" >> targets.log
case "$1" in
  */up)
    cat up-output.txt
    ;;
  */down)
    echo "stopping"
    ;;
esac
exit "$(cat exit-code.txt 2>/dev/null || echo 0)"
"#;

fn tool_dir(up_output: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fake-make.sh"), FAKE_MAKE).unwrap();
    std::fs::write(dir.path().join("up-output.txt"), up_output).unwrap();
    dir
}

fn targets_run(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("targets.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn tool_config(policy: ParsePolicy) -> PairConfig {
    let mut config = PairConfig::default();
    config.external_tool.program = "sh".into();
    config.external_tool.args = vec!["fake-make.sh".into()];
    config.external_tool.parse_policy = policy;
    config
}

fn manager_with(config: PairConfig) -> (Arc<MockRuntime>, PairedProcessManager) {
    init_test_logging();
    let runtime = Arc::new(MockRuntime::new());
    let manager = PairedProcessManager::new(runtime.clone(), config).unwrap();
    (runtime, manager)
}

/// Registers the containers the real tool would have started for `node_index`.
async fn simulate_tool_containers(
    runtime: &MockRuntime,
    manager: &PairedProcessManager,
    node_index: u32,
) -> Result<()> {
    let network = manager.resolve_network().await?;
    let volume = VolumeHandle {
        name: format!("socketvolume-{}", node_index),
    };
    runtime.add_running_container(manager.engine_spec(node_index, &network, &volume));
    runtime.add_running_container(manager.node_spec(node_index, &network, &volume));
    Ok(())
}

const KEYS_OUTPUT: &str = "\
generating keys for node-1
echo CL_VALIDATOR_PUBLIC_KEY=abc123 >> node-1/.casperlabs/.env
echo CL_VALIDATOR_PRIVATE_KEY=secret456 >> node-1/.casperlabs/.env
docker run -d --name node-1 casperlabs/node:latest
";

#[tokio::test]
async fn tool_pair_is_adopted_with_parsed_credentials() -> Result<()> {
    let dir = tool_dir(KEYS_OUTPUT);
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));
    simulate_tool_containers(&runtime, &manager, 1).await?;

    let mut pair = manager.create_via_external_tool(1, dir.path()).await?;

    assert_eq!(pair.strategy(), StartupStrategy::ExternalTool);
    assert_eq!(pair.credentials().public_key(), Some("abc123"));
    assert_eq!(pair.credentials().private_key(), Some("secret456"));
    assert_eq!(pair.node().unwrap().name, "node-1");
    assert_eq!(pair.engine().unwrap().name, "execution-engine-1");

    manager.shutdown(&mut pair).await;

    assert!(runtime.container_names().is_empty());
    assert_eq!(targets_run(dir.path()), vec!["node-1/up", "node-1/down"]);
    Ok(())
}

#[tokio::test]
async fn missing_container_after_tool_run_is_reported() {
    let dir = tool_dir(KEYS_OUTPUT);
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));

    let err = manager
        .create_via_external_tool(5, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(&err, PairError::ProcessNotFound(name) if name == "node-5"));
    assert_eq!(err.to_string(), "Docker container 'node-5' not found");
    // Whatever the tool left behind is cleaned up.
    assert_eq!(targets_run(dir.path()), vec!["node-5/up", "node-5/down"]);
    assert!(runtime.container_names().is_empty());
    assert!(manager.active_indices().await.is_empty());
}

#[tokio::test]
async fn missing_engine_removes_the_orphaned_node() -> Result<()> {
    let dir = tool_dir(KEYS_OUTPUT);
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));
    let network = manager.resolve_network().await?;
    let volume = VolumeHandle {
        name: "socketvolume-2".into(),
    };
    runtime.add_running_container(manager.node_spec(2, &network, &volume));

    let err = manager
        .create_via_external_tool(2, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(&err, PairError::ProcessNotFound(name) if name == "execution-engine-2"));
    assert!(runtime.container_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn lenient_parsing_leaves_absent_keys_unset() -> Result<()> {
    let dir = tool_dir("CL_VALIDATOR_PUBLIC_KEY=\nnothing else here\n");
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));
    simulate_tool_containers(&runtime, &manager, 0).await?;

    let pair = manager.create_via_external_tool(0, dir.path()).await?;

    assert_eq!(pair.credentials().public_key(), None);
    assert_eq!(pair.credentials().private_key(), None);
    Ok(())
}

#[tokio::test]
async fn strict_parsing_rejects_missing_keys_and_runs_down() -> Result<()> {
    let dir = tool_dir("CL_VALIDATOR_PUBLIC_KEY=abc123\n");
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Strict));
    simulate_tool_containers(&runtime, &manager, 0).await?;

    let err = manager
        .create_via_external_tool(0, dir.path())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PairError::CredentialParse {
            key: "CL_VALIDATOR_PRIVATE_KEY",
            ..
        }
    ));
    assert_eq!(targets_run(dir.path()), vec!["node-0/up", "node-0/down"]);
    assert!(runtime.container_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_tool_surfaces_exit_code_and_releases_index() {
    let dir = tool_dir("");
    std::fs::write(dir.path().join("exit-code.txt"), "2").unwrap();
    let (_runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));

    let err = manager
        .create_via_external_tool(0, dir.path())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, PairError::ExternalTool { target, code: Some(2), .. } if target == "node-0/up"),
        "{err}"
    );
    assert!(manager.active_indices().await.is_empty());
}

#[tokio::test]
async fn up_dispatches_to_the_configured_tool() -> Result<()> {
    let dir = tool_dir(KEYS_OUTPUT);
    let mut config = tool_config(ParsePolicy::Lenient);
    config.strategy = StartupStrategy::ExternalTool;
    config.external_tool.working_dir = Some(dir.path().to_path_buf());
    let (runtime, manager) = manager_with(config);
    simulate_tool_containers(&runtime, &manager, 1).await?;

    let pair = manager.up(1).await?;

    assert_eq!(pair.strategy(), StartupStrategy::ExternalTool);
    assert_eq!(targets_run(dir.path()), vec!["node-1/up"]);
    Ok(())
}

#[tokio::test]
async fn tool_strategy_without_directory_is_a_config_error() {
    let mut config = tool_config(ParsePolicy::Lenient);
    config.strategy = StartupStrategy::ExternalTool;
    let (_runtime, manager) = manager_with(config);

    let err = manager.up(0).await.unwrap_err();

    assert!(matches!(
        err,
        PairError::Config(ConfigError::Invalid {
            field: "external_tool.working_dir",
            ..
        })
    ));
}

#[tokio::test]
async fn attach_with_tool_runs_down_on_shutdown() -> Result<()> {
    let dir = tool_dir(KEYS_OUTPUT);
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));
    simulate_tool_containers(&runtime, &manager, 4).await?;

    let mut pair = manager.attach(4, Some(dir.path())).await?;
    manager.shutdown(&mut pair).await;

    assert_eq!(targets_run(dir.path()), vec!["node-4/down"]);
    assert!(runtime.container_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn tool_teardown_of_an_engine_only_pair_still_runs_down() -> Result<()> {
    let dir = tool_dir(KEYS_OUTPUT);
    let (runtime, manager) = manager_with(tool_config(ParsePolicy::Lenient));
    let network = manager.resolve_network().await?;
    let volume = VolumeHandle {
        name: "socketvolume-3".into(),
    };
    runtime.add_running_container(manager.engine_spec(3, &network, &volume));

    let mut pair = manager.attach_remains(3, Some(dir.path())).await?;
    manager.shutdown(&mut pair).await;

    assert_eq!(targets_run(dir.path()), vec!["node-3/down"]);
    assert!(runtime.container_names().is_empty());
    Ok(())
}
