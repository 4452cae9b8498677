pub mod web;

#[cfg(test)]
pub mod fake;

use crate::model::PageItem;
use crate::query::SearchQuery;
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

#[derive(Deserialize, Clone)]
pub struct Authentication {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Authentication {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let auth = fs::read_to_string(path)
            .await
            .context("Unable to read auth file")?;
        let auth =
            serde_json::from_str::<Self>(&auth).context("Unable to deserialize auth file")?;
        for (key, value) in [
            ("username", &auth.username),
            ("email", &auth.email),
            ("password", &auth.password),
        ] {
            if value.trim().is_empty() {
                bail!("Missing `{key}` in auth file");
            }
        }
        Ok(auth)
    }
}

impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authentication")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Why a page could not be fetched
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<PageItem>,
}

/// Pagination over a single search. The cursor state is owned by the
/// implementation, a failed fetch leaves it untouched so the same request can
/// be retried.
#[async_trait]
pub trait PageCursor: Send {
    async fn fetch_first(&mut self) -> Result<Page, FetchError>;

    async fn fetch_next(&mut self) -> Result<Page, FetchError>;

    /// True once the upstream has signalled there are no further pages
    fn is_exhausted(&self) -> bool;
}

#[async_trait]
pub trait TwitterClient: Send + Sync {
    async fn login(&self, auth: &Authentication) -> anyhow::Result<()>;

    /// Prepares a search; nothing is requested until the cursor is polled
    fn search(&self, query: SearchQuery) -> Box<dyn PageCursor>;
}

/// Creates a fresh, unauthenticated client for each session
pub trait ClientFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn TwitterClient>>;
}
