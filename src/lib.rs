//! Build orchestrator for a media server's third-party native libraries.
//!
//! Each library is described declaratively (where its source archive lives,
//! what it must hash to, how it is built, which files prove it is installed)
//! and the orchestrator turns a table of those descriptors into a populated
//! install prefix for one target platform:
//!
//! ```text
//! DescriptorTable ──► graph::resolve_order ──► preflight
//!                                                 │
//!      ┌──────────────── per project, dependency order, N workers ─────┐
//!      │  lock ─► sentinels? ─► Fetcher ─► Unpacker ─► Adapter ─► verify │
//!      └────────────────────────────────────────────────────────────────┘
//!                                                 │
//!                                         run-report.json
//! ```
//!
//! - [`descriptor`]: descriptors, the validated table and TOML manifests
//! - [`libs`]: the built-in table of libraries
//! - [`fetch`]: cached, checksum-verified downloads
//! - [`unpack`]: extraction, source edits, patch series and bootstrap
//! - [`adapter`]: one build strategy per [`descriptor::BuildKind`]
//! - [`orchestrator`]: ordering, scheduling, locking and the run report
//!
//! # Example
//!
//! ```rust,no_run
//! use deps_builder::config::{BuildConfig, ConfigFile, Overrides};
//!
//! let config = BuildConfig::resolve(ConfigFile::default(), Overrides::default())?;
//! let table = deps_builder::libs::media_server_libs()?;
//! let report = deps_builder::orchestrator::run(&["curl".to_string()], &table, &config)?;
//! if let Some(failure) = report.failure() {
//!     eprintln!("{} failed during {:?}", failure.project, failure.stage);
//! }
//! # Ok::<(), deps_builder::Error>(())
//! ```

pub mod adapter;
pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub(crate) mod fsutil;
pub mod libs;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod toolchain;
pub mod unpack;

pub use config::BuildConfig;
pub use descriptor::{BuildKind, DescriptorTable, ProjectDescriptor};
pub use error::{Error, Result, Stage};
pub use orchestrator::{run, RunReport};
pub use toolchain::{Platform, Toolchain};
