//! # relmirror-github
//!
//! Production collaborators for the mirror engine: a blocking GitHub REST
//! client ([`GithubClient`]), a streamed [`HttpDownloader`], and a
//! [`GitCommitter`] that records the ledger in the working tree.

pub mod client;
pub mod download;
pub mod error;
pub mod git;

pub use client::{archive_url, GithubClient, DEFAULT_API_URL};
pub use download::HttpDownloader;
pub use error::GithubError;
pub use git::{commit_message, GitCommitter};
