//! Scripted stand-ins for the platform client, used by loop and HTTP tests

use crate::model::{Media, PageItem};
use crate::query::SearchQuery;
use crate::twitter::{
    Authentication, ClientFactory, FetchError, Page, PageCursor, TwitterClient,
};
use anyhow::bail;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub fn item(n: usize) -> PageItem {
    PageItem {
        id: format!("{}", 1_000 + n),
        author_name: format!("Author {n}"),
        author_handle: format!("author{n}"),
        text: format!("post\nnumber {n}"),
        full_text: None,
        created_at: "Tue May 14 09:30:00 +0000 2024".to_string(),
        retweet_count: 100 + n as u64,
        favorite_count: 1_000 + n as u64,
        media: if n % 2 == 0 {
            vec![Media {
                url: format!("https://pbs.twimg.com/media/{n}.jpg"),
            }]
        } else {
            vec![]
        },
    }
}

type Script = Box<dyn FnMut(usize) -> Result<Page, FetchError> + Send>;

/// Answers each fetch by calling the script with the zero based call number,
/// recording the (virtual) time of every call.
pub struct ScriptedCursor {
    script: Script,
    calls: Arc<Mutex<Vec<Instant>>>,
    exhausted_after: Option<usize>,
    delivered: usize,
}

impl ScriptedCursor {
    pub fn new(script: impl FnMut(usize) -> Result<Page, FetchError> + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Arc::default(),
            exhausted_after: None,
            delivered: 0,
        }
    }

    /// Serves pages of the given sizes in order, then empty pages
    pub fn pages(sizes: Vec<usize>) -> Self {
        let mut next_id = 0;
        Self::new(move |call| {
            let size = sizes.get(call).copied().unwrap_or(0);
            let items = (next_id..next_id + size).map(item).collect();
            next_id += size;
            Ok(Page { items })
        })
    }

    pub fn always(error: FetchError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Reports exhaustion once this many pages were delivered
    pub fn exhausted_after(mut self, pages: usize) -> Self {
        self.exhausted_after = Some(pages);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Instant>>> {
        self.calls.clone()
    }

    fn call(&mut self) -> Result<Page, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Instant::now());
            calls.len() - 1
        };
        let result = (self.script)(call);
        if result.is_ok() {
            self.delivered += 1;
        }
        result
    }
}

#[async_trait]
impl PageCursor for ScriptedCursor {
    async fn fetch_first(&mut self) -> Result<Page, FetchError> {
        self.call()
    }

    async fn fetch_next(&mut self) -> Result<Page, FetchError> {
        self.call()
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted_after
            .map_or(false, |pages| self.delivered >= pages)
    }
}

#[derive(Clone, Default)]
pub struct FakeClient {
    pub login_error: Option<String>,
    pub pages: Vec<usize>,
    pub searches: Arc<Mutex<Vec<SearchQuery>>>,
}

#[async_trait]
impl TwitterClient for FakeClient {
    async fn login(&self, _auth: &Authentication) -> anyhow::Result<()> {
        if let Some(e) = &self.login_error {
            bail!("{e}");
        }
        Ok(())
    }

    fn search(&self, query: SearchQuery) -> Box<dyn PageCursor> {
        self.searches.lock().unwrap().push(query);
        Box::new(ScriptedCursor::pages(self.pages.clone()))
    }
}

pub struct FakeFactory(pub FakeClient);

impl ClientFactory for FakeFactory {
    fn create(&self) -> anyhow::Result<Box<dyn TwitterClient>> {
        Ok(Box::new(self.0.clone()))
    }
}

pub fn auth() -> Authentication {
    Authentication {
        username: "newsbot".to_string(),
        email: "bot@example.com".to_string(),
        password: "hunter2".to_string(),
    }
}
