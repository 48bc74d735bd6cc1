// src/lib.rs

//! apkget
//!
//! A local package-repository client for Android APKs. It mirrors a remote
//! package index, caches artifacts, and installs them into a per-package
//! directory tree with native libraries deployed for the wanted ABIs.
//!
//! # Architecture
//!
//! - Index store: the remote `index.json`, cached locally and replaced
//!   wholesale on update
//! - Cache: artifacts mirrored under the cache root, validated by size
//! - Installer: hard links into `install/<identity>/` plus `lib/<isa>/`
//! - Query and resolver: regex search and partial-name expansion
//! - `Repo`: the explicit context tying the pieces together

pub mod cache;
pub mod config;
mod error;
pub mod index;
pub mod install;
pub mod query;
pub mod repo;
pub mod repository;
pub mod resolver;

pub use config::RepoConfig;
pub use error::{Error, Result};
pub use repo::Repo;
