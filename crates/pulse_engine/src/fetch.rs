use std::fmt;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use pipeline_logging::pipeline_debug;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    /// Search endpoint path, joined onto the entry URL.
    pub search_path: String,
    /// Query parameter carrying the target name.
    pub search_param: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            search_path: "stocks/search".to_string(),
            search_param: "q".to_string(),
        }
    }
}

/// One fetched page: final URL after redirects plus the undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub url: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True when the whole fetch session is unusable, as opposed to a
    /// single target's page failing.
    pub fn is_session_loss(&self) -> bool {
        self.kind == FetchFailureKind::SessionLost
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Network,
    /// The session died or was never opened; no further target can fetch.
    SessionLost,
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailureKind::InvalidUrl => write!(f, "invalid url"),
            FetchFailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FetchFailureKind::Timeout => write!(f, "timeout"),
            FetchFailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FetchFailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FetchFailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FetchFailureKind::Network => write!(f, "network error"),
            FetchFailureKind::SessionLost => write!(f, "fetch session lost"),
        }
    }
}

/// One browser-like fetch session, exclusively owned by the work queue for
/// the lifetime of a run and reused across the retry pass.
pub trait SessionFetcher {
    /// Opens the session against the site's entry page.
    fn open(&mut self, entry_url: &str) -> Result<(), FetchError>;

    /// Searches for the target and lands on its page; returns the final URL.
    fn search_and_navigate(&mut self, target_name: &str) -> Result<String, FetchError>;

    /// The page the session currently sits on.
    fn current_page_content(&self) -> Result<RawPage, FetchError>;

    /// Releases the session. Further calls fail as session loss.
    fn close(&mut self);
}

/// HTTP implementation over reqwest, driven synchronously from an owned
/// runtime so the pipeline stays strictly sequential.
pub struct HttpSessionFetcher {
    settings: FetchSettings,
    runtime: tokio::runtime::Runtime,
    session: Option<Session>,
}

struct Session {
    client: reqwest::Client,
    entry: reqwest::Url,
    redirect_counter: Arc<AtomicUsize>,
    current: Option<RawPage>,
}

impl HttpSessionFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|err| FetchError::new(FetchFailureKind::SessionLost, err.to_string()))?;
        Ok(Self {
            settings,
            runtime,
            session: None,
        })
    }

    fn build_client(
        &self,
        redirect_counter: Arc<AtomicUsize>,
    ) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FetchFailureKind::SessionLost, err.to_string()))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    fn get(&self, session: &Session, url: reqwest::Url) -> Result<RawPage, FetchError> {
        self.runtime.block_on(async {
            let response = session
                .client
                .get(url)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::new(
                    FetchFailureKind::HttpStatus(status.as_u16()),
                    status.to_string(),
                ));
            }

            if let Some(content_len) = response.content_length() {
                if content_len > self.settings.max_bytes {
                    return Err(FetchError::new(
                        FetchFailureKind::TooLarge {
                            max_bytes: self.settings.max_bytes,
                            actual: Some(content_len),
                        },
                        "response too large",
                    ));
                }
            }

            let final_url = response.url().to_string();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_string());

            if let Some(ct) = content_type.as_deref() {
                if !self.is_content_type_allowed(ct) {
                    return Err(FetchError::new(
                        FetchFailureKind::UnsupportedContentType {
                            content_type: ct.to_string(),
                        },
                        "unsupported content type",
                    ));
                }
            }

            let mut bytes = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(map_reqwest_error)?;
                let next_len = bytes.len() as u64 + chunk.len() as u64;
                if next_len > self.settings.max_bytes {
                    return Err(FetchError::new(
                        FetchFailureKind::TooLarge {
                            max_bytes: self.settings.max_bytes,
                            actual: Some(next_len),
                        },
                        "response too large",
                    ));
                }
                bytes.extend_from_slice(&chunk);
            }

            Ok(RawPage {
                url: final_url,
                bytes,
                content_type,
            })
        })
    }

    fn session(&self) -> Result<&Session, FetchError> {
        self.session.as_ref().ok_or_else(|| {
            FetchError::new(FetchFailureKind::SessionLost, "session not open")
        })
    }
}

impl SessionFetcher for HttpSessionFetcher {
    fn open(&mut self, entry_url: &str) -> Result<(), FetchError> {
        let entry = reqwest::Url::parse(entry_url)
            .map_err(|err| FetchError::new(FetchFailureKind::InvalidUrl, err.to_string()))?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirect_counter.clone())?;
        let mut session = Session {
            client,
            entry,
            redirect_counter,
            current: None,
        };

        // The warm-up request proves the host is reachable before the batch
        // starts; an unreachable host is a session loss, not a target failure.
        let page = self
            .get(&session, session.entry.clone())
            .map_err(|err| match err.kind {
                FetchFailureKind::Network => {
                    FetchError::new(FetchFailureKind::SessionLost, err.message)
                }
                _ => err,
            })?;
        session.current = Some(page);
        self.session = Some(session);
        Ok(())
    }

    fn search_and_navigate(&mut self, target_name: &str) -> Result<String, FetchError> {
        let page = {
            let session = self.session()?;
            let mut url = session
                .entry
                .join(&self.settings.search_path)
                .map_err(|err| FetchError::new(FetchFailureKind::InvalidUrl, err.to_string()))?;
            url.query_pairs_mut()
                .append_pair(&self.settings.search_param, target_name);
            let page = self.get(session, url)?;
            pipeline_debug!(
                "{}: landed on {} after {} redirect(s)",
                target_name,
                page.url,
                session.redirect_counter.load(Ordering::Relaxed)
            );
            page
        };

        let final_url = page.url.clone();
        if let Some(session) = self.session.as_mut() {
            session.current = Some(page);
        }
        Ok(final_url)
    }

    fn current_page_content(&self) -> Result<RawPage, FetchError> {
        self.session()?
            .current
            .clone()
            .ok_or_else(|| FetchError::new(FetchFailureKind::SessionLost, "no page loaded"))
    }

    fn close(&mut self) {
        self.session = None;
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchFailureKind::Timeout, err.to_string());
    }
    if err.is_connect() {
        // The transport under an established session went away.
        return FetchError::new(FetchFailureKind::SessionLost, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FetchFailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FetchFailureKind::Network, err.to_string())
}
