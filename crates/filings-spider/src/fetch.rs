use crate::http::*;
use crate::{Error, FetchError, Result};
use std::time::Duration;
use tracing::{error, trace, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for one attempt, response body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// When, and how often, a failed GET request is retried.
///
/// Connection errors, timeouts, interrupted body reads and any status in `status_forcelist` all
/// count as one failure each; a request is attempted at most `max_retries + 1` times.
///
/// After `n` consecutive failures the fetcher sleeps for
/// `backoff_factor * 2^(n - 1)`, capped at `max_backoff`; the first retry is immediate.
///
/// ```rust
/// use filings_spider::fetch::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.backoff(1), Duration::ZERO);
/// assert_eq!(policy.backoff(2), Duration::from_millis(600));
/// assert_eq!(policy.backoff(3), Duration::from_millis(1200));
/// ```
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
    pub status_forcelist: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: Duration::from_millis(300),
            max_backoff: Duration::from_secs(120),
            status_forcelist: vec![
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next attempt, given the number of consecutive failures so far.
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors <= 1 {
            return Duration::ZERO;
        }
        let multiplier = 2u32.saturating_pow(consecutive_errors - 1);
        self.backoff_factor
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }

    pub fn retries_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status)
    }
}

/// HTTP client shared by every request of a run.
///
/// Built once, with the SEC-mandated `User-Agent`, and handed by reference to whichever
/// process needs it.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: HttpClient,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(user_agent: &str, policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| {
                error!("failed to build reqwest client, error({err})");
                Error::Client(err)
            })?;
        Ok(Self {
            client,
            policy,
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Build a fetcher with the `USER_AGENT` environment variable (`.env` files included).
    ///
    /// The SEC rejects anonymous traffic, so the variable is required.
    pub fn from_env(policy: RetryPolicy) -> Result<Self> {
        let user_agent = dotenv::var("USER_AGENT").map_err(|_| {
            error!("environment variable USER_AGENT not set");
            Error::Config("environment variable USER_AGENT must be set".to_string())
        })?;
        Self::new(&user_agent, policy)
    }

    /// Time allowed for each attempt of [`Fetcher::get_text`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// GET `url`, returning the response body as text.
    pub async fn get_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.get_text_within(url, self.timeout).await
    }

    /// [`Fetcher::get_text`], allowing each attempt `timeout` instead; for large files.
    pub async fn get_text_within(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<String, FetchError> {
        let mut errors = 0;
        loop {
            trace!("GET {url}");
            let failure = match self.client.get(url).timeout(timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    if self.policy.retries_status(status) {
                        format!("status {status}")
                    } else if !status.is_success() {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    } else {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(err) if is_transient(&err) => err.to_string(),
                            Err(err) => {
                                return Err(FetchError::Transport {
                                    url: url.to_string(),
                                    source: err,
                                })
                            }
                        }
                    }
                }
                Err(err) if is_transient(&err) => err.to_string(),
                Err(err) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source: err,
                    })
                }
            };

            errors += 1;
            if errors > self.policy.max_retries {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: errors,
                    last: failure,
                });
            }

            let backoff = self.policy.backoff(errors);
            warn!(
                "GET {url} failed ({failure}), retry {errors}/{} in {:.1}s",
                self.policy.max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

// connect, read & timeout failures are worth another attempt; malformed requests and redirect
// loops are not
fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_builder() || err.is_redirect() {
        return false;
    }
    err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
}
