//! depsync-lib: pinned dependency synchronization.
//!
//! A source manifest of `{id, version, path}` pins is decoded into a
//! [`manifest::DependencyTable`], projected into a generated artifact, and
//! reconciled against what is checked out in a workspace:
//!
//! - [`entry`] / [`version`]: validated pins and their classified versions
//! - [`manifest`]: the table, the artifact codec, and source manifest loading
//! - [`regenerate`]: source manifest -> artifact
//! - [`plan`]: pure diff of desired vs observed state
//! - [`execute`]: concurrent, isolated application of a plan
//! - [`backend`]: git and package checkout backends
//! - [`workspace`]: root resolution, ledger, lock, local state observation
//! - [`sync`]: one locked observe/plan/execute pass

pub mod backend;
pub mod config;
pub mod consts;
pub mod entry;
pub mod execute;
pub mod manifest;
pub mod plan;
pub mod regenerate;
pub mod sync;
pub mod version;
pub mod workspace;
