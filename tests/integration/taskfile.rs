//! The built-in taskfile and how variables are layered onto it.

use crate::fixtures::Workspace;
use bminfra::config::Config;
use bminfra::core::{TaskGraph, Taskfile};
use bminfra::executor::DryRunExecutor;
use bminfra::{Error, Sequencer};

fn builtin_vars(config: &Config, taskfile: &Taskfile) -> bminfra::vars::Vars {
    let mut vars = config.to_vars(&taskfile.base_dir).unwrap();
    vars.add_defaults(&taskfile.vars, |_| None).unwrap();
    vars
}

#[test]
fn test_builtin_dry_run_full_flow() {
    let taskfile = Taskfile::builtin("/work".into()).unwrap();
    let graph = taskfile.graph().unwrap();
    let config = Config {
        branch: Some("feature-x".to_string()),
        image: Some("/images/discovery.iso".to_string()),
        ..Default::default()
    };
    let vars = builtin_vars(&config, &taskfile);

    let mut seq = Sequencer::new(&graph, DryRunExecutor::new(), vars, "/work".into());
    let report = seq.run(&["run_full_flow"]).unwrap();

    let executed = report.executed();
    let pos = |name: &str| executed.iter().position(|n| *n == name).unwrap();
    assert!(pos("install_minikube") < pos("start_minikube"));
    assert!(pos("start_minikube") < pos("deploy_bm_inventory"));
    assert!(pos("deploy_bm_inventory") < pos("run"));
    assert!(pos("copy_terraform_files") < pos("deploy_nodes"));
    assert_eq!(executed.last(), Some(&"run_full_flow"));

    let planned = &seq.executor().planned;
    assert!(planned.iter().any(|(task, step)| task == "bring_bm_inventory"
        && step.contains("@feature-x")
        && step.contains("/work/build/bm-inventory")));
    assert!(planned
        .iter()
        .any(|(task, step)| task == "start_minikube" && step.contains("ensure 'minikube'")));
}

#[test]
fn test_builtin_destroy_plan() {
    let taskfile = Taskfile::builtin("/work".into()).unwrap();
    let graph = taskfile.graph().unwrap();
    let plan: Vec<&str> = graph
        .resolve(&["destroy"])
        .unwrap()
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(plan, vec!["destroy_nodes", "delete_minikube", "destroy"]);
}

#[test]
fn test_config_overrides_taskfile_defaults() {
    let taskfile = Taskfile::builtin("/work".into()).unwrap();
    let mut config = Config::default();
    config.vars.insert("PROFILE".to_string(), "bm-ci".to_string());
    config.staging_dir = Some("/var/tmp/bminfra".to_string());

    let vars = builtin_vars(&config, &taskfile);
    assert_eq!(vars.get("PROFILE"), Some("bm-ci"));
    assert_eq!(vars.get("TF_DIR"), Some("/var/tmp/bminfra/terraform"));
    assert_eq!(vars.get("NUM_MASTERS"), Some("3"));
}

#[test]
fn test_locate_prefers_local_taskfile() {
    let ws = Workspace::new();
    ws.write(
        "bminfra.toml",
        r#"
        [[task]]
        name = "only"
        "#,
    );
    let taskfile = Taskfile::locate(None, &Config::default(), &ws.path).unwrap();
    assert_eq!(taskfile.tasks.len(), 1);
    assert_eq!(taskfile.base_dir, ws.path);

    let explicit = ws.write(
        "other/tasks.toml",
        r#"
        [[task]]
        name = "a"

        [[task]]
        name = "b"
        "#,
    );
    let taskfile = Taskfile::locate(Some(&explicit), &Config::default(), &ws.path).unwrap();
    assert_eq!(taskfile.tasks.len(), 2);
    assert_eq!(taskfile.base_dir, ws.path.join("other"));
}

#[test]
fn test_locate_falls_back_to_builtin() {
    let ws = Workspace::new();
    let taskfile = Taskfile::locate(None, &Config::default(), &ws.path).unwrap();
    assert!(taskfile.graph().unwrap().contains_task("run"));
    assert_eq!(taskfile.base_dir, ws.path);
}

#[test]
fn test_cyclic_taskfile_rejected_at_load() {
    let ws = Workspace::new();
    let taskfile = ws.taskfile(
        r#"
        [[task]]
        name = "start_minikube"
        needs = ["deploy_bm_inventory"]

        [[task]]
        name = "deploy_bm_inventory"
        needs = ["start_minikube"]
        "#,
    );
    let err: Error = TaskGraph::from_tasks(taskfile.tasks.clone()).unwrap_err();
    assert!(matches!(err, Error::Cycle(ref path) if path.len() == 3));
}

#[test]
fn test_undefined_variable_fails_step() {
    let ws = Workspace::new();
    let (result, _) = ws.run(
        r#"
        [[task]]
        name = "bad"

        [[task.step]]
        kind = "remove"
        path = "${BMINFRA_SURELY_UNDEFINED_VARIABLE}"
        "#,
        &["bad"],
    );
    match result.unwrap_err() {
        Error::StepFailed { reason, .. } => assert!(reason.contains("BMINFRA_SURELY_UNDEFINED_VARIABLE")),
        other => panic!("expected StepFailed, got {other:?}"),
    }
}
