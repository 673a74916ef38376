//! Runtime-independent install machinery.
//!
//! - HTTP retrieval behind [`HttpClient`], with a `reqwest` implementation.
//! - Background downloads with a single terminal outcome.
//! - Archive validation and staged extraction for zip and tar.gz.
//! - Install directory layout and the [`Lifecycle`] engine that drives a
//!   version from download to activation.

pub mod archive;
pub mod checksum;
mod download;
mod http;
pub mod layout;
mod lifecycle;
mod target;

pub use download::{DownloadJob, DownloadOutcome, DownloadProgress};
pub use http::{ByteStream, ClientBuildError, HttpClient, HttpOptions, ReqwestClient};
pub use layout::{InstallLayout, RuntimeLayout};
pub use lifecycle::{ArchiveResolver, ArchiveSource, Lifecycle};
pub use target::{HostArch, HostOs, HostTarget};
