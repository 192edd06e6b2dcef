//! Read-only CI/source-control provider boundary.

pub mod client;
pub mod types;

pub use client::{CiProvider, GithubClient};
