use crate::settings::Settings;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::{Client, Method, RequestBuilder};
use std::fmt;
use std::time::Duration;
use url::Url;

const CACHE_BUST_PARAM: &str = "nocache";

pub(crate) fn build_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// A measurement target. Every request built from it asks intermediaries not
/// to cache, and optionally carries a random query parameter as well.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
    cache_bust: bool,
}

impl Endpoint {
    pub fn new(url: Url, cache_bust: bool) -> Self {
        Self { url, cache_bust }
    }

    pub(crate) fn target(&self) -> Url {
        let mut url = self.url.clone();
        if self.cache_bust {
            let nonce = format!("{:016x}", rand::random::<u64>());
            url.query_pairs_mut().append_pair(CACHE_BUST_PARAM, &nonce);
        }
        url
    }

    pub(crate) fn request(&self, client: &Client, method: Method) -> RequestBuilder {
        client
            .request(method, self.target())
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.url.fmt(f)
    }
}
