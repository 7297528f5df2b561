//! Integration test suite for bminfra.
//!
//! These tests drive taskfiles end to end with the real process executor,
//! using `sh` scripts that write marker files in place of minikube, virsh
//! and terraform. Nothing touches the host's VMs or clusters.
//!
//! # Test Categories
//!
//! - `sequencing`: ordering, dedup, fail-fast and best-effort teardown
//! - `guard`: `ensure_resource` steps against fake enumerations
//! - `staging`: template copies, tfvars updates and branch clones
//! - `taskfile`: the built-in taskfile and variable layering

mod fixtures;

mod staging;
mod taskfile;
