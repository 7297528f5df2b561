//! Copy-if-absent, tfvars and clone-if-absent steps.

use serde_json::Value;

use crate::fixtures::{git_repo, Workspace};
use bminfra::executor::{ProcessExecutor, StepContext, StepExecutor, StepOutcome};
use bminfra::git::GitOps;

const TERRAFORM: &str = r#"
[vars]
TF_DIR = "${STAGING_DIR}/terraform"

[[task]]
name = "copy_terraform_files"

[[task.step]]
kind = "copy_if_absent"
from = "terraform_files"
to = "${TF_DIR}"

[[task.step]]
kind = "tfvars"
file = "${TF_DIR}/terraform.tfvars.json"
set = { master_count = "${NUM_MASTERS}", image_path = "/images/installer.iso", worker_count = 2 }

[[task]]
name = "clean"

[[task.step]]
kind = "remove"
path = "${STAGING_DIR}"
"#;

fn templates(ws: &Workspace) {
    ws.write("terraform_files/main.tf", "resource \"libvirt_domain\" \"master\" {}");
    ws.write(
        "terraform_files/terraform.tfvars.json",
        r#"{"master_count": 1, "cluster_name": "test-infra-cluster"}"#,
    );
}

#[test]
fn test_copy_and_fill_tfvars() {
    let ws = Workspace::new();
    templates(&ws);
    let (result, _) = ws.run(TERRAFORM, &["copy_terraform_files"]);
    result.unwrap();

    assert!(ws.exists("build/terraform/main.tf"));
    let tfvars: Value =
        serde_json::from_str(&ws.read("build/terraform/terraform.tfvars.json")).unwrap();
    assert_eq!(tfvars["master_count"], 3);
    assert_eq!(tfvars["image_path"], "/images/installer.iso");
    assert_eq!(tfvars["worker_count"], 2);
    assert_eq!(tfvars["cluster_name"], "test-infra-cluster");
}

#[test]
fn test_rerun_keeps_staged_state() {
    let ws = Workspace::new();
    templates(&ws);
    ws.run(TERRAFORM, &["copy_terraform_files"]).0.unwrap();
    ws.write("build/terraform/terraform.tfstate", "{\"serial\": 4}");
    ws.write("terraform_files/main.tf", "changed upstream");

    ws.run(TERRAFORM, &["copy_terraform_files"]).0.unwrap();
    assert_eq!(ws.read("build/terraform/terraform.tfstate"), "{\"serial\": 4}");
    assert_ne!(ws.read("build/terraform/main.tf"), "changed upstream");
}

#[test]
fn test_missing_templates_fail() {
    let ws = Workspace::new();
    let (result, _) = ws.run(TERRAFORM, &["copy_terraform_files"]);
    assert!(result.is_err());
}

#[test]
fn test_interrupted_copy_is_retried() {
    let ws = Workspace::new();
    ws.write("terraform_files/a_main.tf", "resource \"libvirt_domain\" \"master\" {}");
    let link = ws.path.join("terraform_files/z_link.tf");
    std::os::unix::fs::symlink(ws.path.join("nowhere.tf"), &link).unwrap();

    let (result, _) = ws.run(TERRAFORM, &["copy_terraform_files"]);
    assert!(result.is_err());
    assert!(!ws.exists("build/terraform"));

    std::fs::remove_file(&link).unwrap();
    ws.write("terraform_files/z_vars.tf", "variable \"master_count\" {}");
    ws.run(TERRAFORM, &["copy_terraform_files"]).0.unwrap();
    assert!(ws.exists("build/terraform/a_main.tf"));
    assert!(ws.exists("build/terraform/z_vars.tf"));
}

#[test]
fn test_clean_removes_staging() {
    let ws = Workspace::new();
    templates(&ws);
    ws.run(TERRAFORM, &["copy_terraform_files"]).0.unwrap();
    assert!(ws.exists("build"));

    ws.run(TERRAFORM, &["clean"]).0.unwrap();
    assert!(!ws.exists("build"));

    // Cleaning twice is fine.
    ws.run(TERRAFORM, &["clean"]).0.unwrap();
}

#[test]
fn test_clone_branch_from_local_repo() {
    let ws = Workspace::new();
    let upstream = ws.path.join("upstream");
    git_repo(&upstream, "release-4.6", "Makefile", "deploy-all:\n\ttrue\n");

    let dest = ws.path.join("build/bm-inventory");
    GitOps::clone_branch(upstream.to_str().unwrap(), "release-4.6", &dest).unwrap();

    assert!(dest.join("Makefile").exists());
    assert_eq!(
        GitOps::current_branch(&dest).unwrap().as_deref(),
        Some("release-4.6")
    );
}

#[test]
fn test_clone_if_absent_step() {
    let ws = Workspace::new();
    let upstream = ws.path.join("upstream");
    git_repo(&upstream, "master", "README.md", "# bm-inventory\n");

    let content = format!(
        r#"
        [vars]
        BMI_REPO = "{}"

        [[task]]
        name = "bring_bm_inventory"

        [[task.step]]
        kind = "clone_if_absent"
        url = "${{BMI_REPO}}"
        branch = "${{BMI_BRANCH}}"
        dest = "${{STAGING_DIR}}/bm-inventory"
        "#,
        upstream.display()
    );

    ws.run(&content, &["bring_bm_inventory"]).0.unwrap();
    assert!(ws.exists("build/bm-inventory/README.md"));

    // Second run must not touch the existing checkout.
    ws.write("build/bm-inventory/local.txt", "keep me");
    ws.run(&content, &["bring_bm_inventory"]).0.unwrap();
    assert_eq!(ws.read("build/bm-inventory/local.txt"), "keep me");
}

#[test]
fn test_clone_step_skips_existing_dest() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.path.join("checkout")).unwrap();
    let taskfile = ws.taskfile(
        r#"
        [[task]]
        name = "bring"

        [[task.step]]
        kind = "clone_if_absent"
        url = "https://example.invalid/repo.git"
        branch = "master"
        dest = "checkout"
        "#,
    );
    let vars = ws.vars(&taskfile);
    let ctx = StepContext {
        task: "bring",
        index: 1,
        vars: &vars,
        base_dir: &ws.path,
        timeout: None,
    };
    let mut executor = ProcessExecutor::new().unwrap();
    let outcome = executor.execute(&taskfile.tasks[0].steps[0], &ctx).unwrap();
    assert!(matches!(outcome, StepOutcome::Skipped { .. }));
}
