use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::CacheStore;

/// Connect and read deadline for every remote request. A hung endpoint must
/// not stall a polling tick past this.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected response status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Fetch-bytes-from-URL primitive. The live implementation is an HTTP client;
/// tests substitute an in-memory stub.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_bytes(&self, url: &str, api_key: Option<&str>)
        -> Result<Vec<u8>, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_bytes(
        &self,
        url: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.get(url);
        if let Some(key) = api_key {
            request = request.header("apikey", key);
        }
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(REQUEST_TIMEOUT)
    } else {
        TransportError::Request(err.to_string())
    }
}

pub type DecodeFn<T> = Box<dyn Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync>;

/// One fetch unit: where to get the bytes, where to cache them, and how to
/// turn them into a value.
pub struct FetchDescriptor<T> {
    pub tag: String,
    pub url: String,
    pub cache_key: String,
    pub use_cache_as_backup: bool,
    pub decode: DecodeFn<T>,
}

impl<T> FetchDescriptor<T> {
    pub fn new(
        tag: impl Into<String>,
        url: impl Into<String>,
        cache_key: impl Into<String>,
        decode: impl Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            url: url.into(),
            cache_key: cache_key.into(),
            use_cache_as_backup: false,
            decode: Box::new(decode),
        }
    }

    pub fn use_cache_as_backup(mut self) -> Self {
        self.use_cache_as_backup = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Live,
    Cache,
}

#[derive(Debug)]
pub struct Fetched<T> {
    pub value: T,
    pub source: FetchSource,
}

type PendingJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Performs the fetch/decode/cache round trip for descriptors. Live bytes are
/// cached only after a successful decode; a cached fallback is never written
/// back, so stale data cannot reinforce itself.
pub struct FetchDispatcher {
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    api_key: ArcSwapOption<String>,
    pending: Mutex<Vec<PendingJob>>,
}

impl FetchDispatcher {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<CacheStore>) -> Self {
        Self {
            transport,
            cache,
            api_key: ArcSwapOption::empty(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Installed once the endpoint directory resolves; forwarded on every
    /// subsequent request.
    pub fn set_api_key(&self, key: Option<String>) {
        self.api_key.store(key.map(Arc::new));
    }

    /// Fetch raw bytes without caching, for one-shot lookups.
    pub async fn fetch_uncached(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let api_key = self.api_key.load_full();
        self.transport
            .fetch_bytes(url, api_key.as_deref().map(String::as_str))
            .await
    }

    pub async fn dispatch<T>(&self, descriptor: FetchDescriptor<T>) -> Result<Fetched<T>, FetchError> {
        let api_key = self.api_key.load_full();
        let live = self
            .transport
            .fetch_bytes(&descriptor.url, api_key.as_deref().map(String::as_str))
            .await;
        match live {
            Ok(bytes) => match (descriptor.decode)(&bytes) {
                Ok(value) => {
                    self.cache.write(&descriptor.cache_key, &bytes);
                    Ok(Fetched {
                        value,
                        source: FetchSource::Live,
                    })
                }
                Err(err) => {
                    warn!(
                        tag = %descriptor.tag,
                        ?err,
                        payload_len = bytes.len(),
                        "live payload failed to decode"
                    );
                    self.fallback(&descriptor, FetchError::Decode(err))
                }
            },
            Err(err) => {
                debug!(tag = %descriptor.tag, ?err, "live fetch failed");
                self.fallback(&descriptor, FetchError::Transport(err))
            }
        }
    }

    fn fallback<T>(
        &self,
        descriptor: &FetchDescriptor<T>,
        live_failure: FetchError,
    ) -> Result<Fetched<T>, FetchError> {
        if !descriptor.use_cache_as_backup {
            return Err(live_failure);
        }
        let Some(bytes) = self.cache.read(&descriptor.cache_key) else {
            return Err(live_failure);
        };
        match (descriptor.decode)(&bytes) {
            Ok(value) => Ok(Fetched {
                value,
                source: FetchSource::Cache,
            }),
            Err(err) => {
                warn!(tag = %descriptor.tag, ?err, "cached payload failed to decode");
                Err(live_failure)
            }
        }
    }

    /// Queues a dispatch + commit pair without running it. Queued jobs run
    /// together on the next `run_queued` call.
    pub fn enqueue<T, F>(self: Arc<Self>, descriptor: FetchDescriptor<T>, commit: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<Fetched<T>, FetchError>) + Send + 'static,
    {
        let dispatcher = Arc::clone(&self);
        let job: PendingJob = Box::pin(async move {
            let result = dispatcher.dispatch(descriptor).await;
            commit(result);
        });
        self.pending.lock().expect("fetch queue lock poisoned").push(job);
    }

    /// Drains the queued jobs and drives them concurrently, so one slow
    /// endpoint cannot delay the rest of the batch.
    pub async fn run_queued(&self) {
        let jobs = std::mem::take(&mut *self.pending.lock().expect("fetch queue lock poisoned"));
        join_all(jobs).await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        collections::{HashMap, VecDeque},
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;

    use super::{Transport, TransportError};

    /// In-memory transport with per-URL stubbed responses and a request log.
    pub(crate) struct FakeTransport {
        responses: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, TransportError>>>>,
        requests: Mutex<Vec<String>>,
        api_keys: Mutex<Vec<Option<String>>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                api_keys: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn stub(&self, url: &str, result: Result<Vec<u8>, TransportError>) {
            self.responses
                .lock()
                .expect("stub lock poisoned")
                .entry(url.to_owned())
                .or_default()
                .push_back(result);
        }

        pub(crate) fn stub_ok(&self, url: &str, bytes: &[u8]) {
            self.stub(url, Ok(bytes.to_vec()));
        }

        pub(crate) fn stub_err(&self, url: &str) {
            self.stub(url, Err(TransportError::Request("stubbed failure".to_owned())));
        }

        pub(crate) fn requested(&self) -> Vec<String> {
            self.requests.lock().expect("request log lock poisoned").clone()
        }

        pub(crate) fn seen_api_keys(&self) -> Vec<Option<String>> {
            self.api_keys.lock().expect("api key log lock poisoned").clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch_bytes(
            &self,
            url: &str,
            api_key: Option<&str>,
        ) -> Result<Vec<u8>, TransportError> {
            self.requests
                .lock()
                .expect("request log lock poisoned")
                .push(url.to_owned());
            self.api_keys
                .lock()
                .expect("api key log lock poisoned")
                .push(api_key.map(ToOwned::to_owned));
            self.responses
                .lock()
                .expect("stub lock poisoned")
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(TransportError::Request(format!("no stub for {url}"))))
        }
    }
}
