use crate::error::Result;
use crate::fetch::DocumentFetcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory fetcher that serves fixed bodies and records requests.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    pub requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.as_str() == url).count()
    }
}

#[async_trait]
impl DocumentFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, url.to_string()).into())
    }
}
