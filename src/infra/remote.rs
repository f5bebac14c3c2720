//! Text resolution delegated to a peer glossa instance over HTTP.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::application::error::ResolveError;
use crate::application::store::StoreHandle;
use crate::cache::{CacheKey, CacheLoader, LoadError};
use crate::domain::types::{LanguageTag, Resolution, TextValue};

const METRIC_REMOTE_CALL_FAILED: &str = "glossa_remote_call_failed_total";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("peer answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable peer response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Loader calling `POST endpoint?repository=&preferredLanguage=` with a JSON
/// array of ids; the peer answers `{id: text}`.
///
/// Keys are grouped by effective language and each group is one call. A
/// failing call turns only its own group into `NotFound`.
#[derive(Clone)]
pub struct RemoteLoader {
    peer: String,
    client: Client,
    endpoint: Url,
}

impl RemoteLoader {
    pub fn new(peer: impl Into<String>, endpoint: Url, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            peer: peer.into(),
            client,
            endpoint,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("glossa/", env!("CARGO_PKG_VERSION"))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[instrument(skip_all, fields(peer = %self.peer, store = %store, keys = keys.len()))]
    pub async fn resolve(
        &self,
        store: &StoreHandle,
        keys: &HashSet<CacheKey>,
    ) -> HashMap<CacheKey, Resolution<TextValue>> {
        let mut groups: HashMap<LanguageTag, Vec<CacheKey>> = HashMap::new();
        for key in keys {
            groups
                .entry(key.effective_language().clone())
                .or_default()
                .push(key.clone());
        }

        let calls = groups.into_iter().map(|(language, keys)| async move {
            let response = self.call(store, &language, &keys).await;
            (language, keys, response)
        });

        let mut resolved = HashMap::with_capacity(keys.len());
        for (language, keys, response) in join_all(calls).await {
            match response {
                Ok(mut texts) => {
                    for key in keys {
                        let text = texts
                            .remove(key.resource().as_str())
                            .flatten()
                            .filter(|text| !text.is_empty());
                        resolved.insert(key, Resolution::from_lookup(text.map(TextValue::plain)));
                    }
                }
                Err(err) => {
                    counter!(METRIC_REMOTE_CALL_FAILED, "peer" => self.peer.clone()).increment(1);
                    warn!(
                        peer = %self.peer,
                        store = %store,
                        language = %language,
                        ids = keys.len(),
                        error = %err,
                        "Remote call failed; group resolved as not found"
                    );
                    resolved.extend(keys.into_iter().map(|key| (key, Resolution::NotFound)));
                }
            }
        }
        resolved
    }

    async fn call(
        &self,
        store: &StoreHandle,
        language: &LanguageTag,
        keys: &[CacheKey],
    ) -> Result<HashMap<String, Option<String>>, RemoteError> {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("repository", store.name())
            .append_pair("preferredLanguage", language.as_str());

        let ids: Vec<&str> = keys.iter().map(|key| key.resource().as_str()).collect();
        debug!(peer = %self.peer, url = %url, ids = ids.len(), "Calling remote peer");

        let response = self.client.post(url).json(&ids).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl CacheLoader<CacheKey, TextValue> for RemoteLoader {
    async fn load(&self, store: &StoreHandle, key: &CacheKey) -> Result<TextValue, LoadError> {
        let keys = HashSet::from([key.clone()]);
        match self.resolve(store, &keys).await.remove(key) {
            Some(Resolution::Found(value)) => Ok(value),
            _ => Err(LoadError::NotFound),
        }
    }

    async fn load_all(
        &self,
        store: &StoreHandle,
        keys: &[CacheKey],
    ) -> Result<HashMap<CacheKey, Resolution<TextValue>>, ResolveError> {
        let keys: HashSet<CacheKey> = keys.iter().cloned().collect();
        Ok(self.resolve(store, &keys).await)
    }
}
