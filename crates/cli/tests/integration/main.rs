//! End-to-end tests driving the `depsync` binary against scratch workspaces.

mod common;
mod regenerate_tests;
mod sync_tests;
