//! Bounded-retry wrapper shared by every upstream lookup.
//!
//! Only a rate-limit response is retried. The client sleeps a fixed backoff
//! after each one and gives up once `max_attempts` rate-limited responses
//! have been seen. Any other non-success status, and any transport failure,
//! ends the lookup immediately. The client never returns an error: callers
//! match on [`LookupOutcome`].

use crate::app::ports::{HttpClientPort, HttpRequest, HttpResponse, SleepPort};
use crate::common::constants::{DEFAULT_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS, RATE_LIMITED_STATUS};
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rate-limited attempts allowed before the lookup is exhausted
    pub max_attempts: u32,
    /// Fixed sleep after every rate-limited response
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
        }
    }
}

/// How a single response moves the retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    RateLimited,
    Failure,
}

impl ResponseClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => ResponseClass::Success,
            RATE_LIMITED_STATUS => ResponseClass::RateLimited,
            _ => ResponseClass::Failure,
        }
    }
}

/// Terminal state of one lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Succeeded(T),
    /// Non-retryable failure: transport error (`status: None`) or a
    /// non-success, non-rate-limit status
    Failed { status: Option<u16>, reason: String },
    /// Every allowed attempt was rate limited
    Exhausted { attempts: u32 },
}

impl<T> LookupOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, LookupOutcome::Succeeded(_))
    }

    /// The payload, or `None` as the "no result" sentinel
    pub fn into_option(self) -> Option<T> {
        match self {
            LookupOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> LookupOutcome<U> {
        match self {
            LookupOutcome::Succeeded(value) => LookupOutcome::Succeeded(f(value)),
            LookupOutcome::Failed { status, reason } => LookupOutcome::Failed { status, reason },
            LookupOutcome::Exhausted { attempts } => LookupOutcome::Exhausted { attempts },
        }
    }
}

pub struct LookupClient {
    http: Arc<dyn HttpClientPort>,
    sleeper: Arc<dyn SleepPort>,
    policy: RetryPolicy,
}

impl LookupClient {
    pub fn new(http: Arc<dyn HttpClientPort>, sleeper: Arc<dyn SleepPort>, policy: RetryPolicy) -> Self {
        Self { http, sleeper, policy }
    }

    pub async fn execute(&self, request: &HttpRequest) -> LookupOutcome<HttpResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            metrics::lookup::attempt();
            let response = match self.http.send(request).await {
                Ok(response) => response,
                Err(reason) => {
                    warn!(url = %request.url, error = %reason, "Lookup failed: transport error");
                    metrics::lookup::failed();
                    return LookupOutcome::Failed { status: None, reason };
                }
            };

            match ResponseClass::of(response.status) {
                ResponseClass::Success => {
                    debug!(url = %request.url, status = response.status, attempts = attempts + 1, "Lookup succeeded");
                    metrics::lookup::succeeded();
                    return LookupOutcome::Succeeded(response);
                }
                ResponseClass::RateLimited => {
                    metrics::lookup::rate_limited();
                    self.sleeper.sleep(self.policy.backoff).await;
                    attempts += 1;
                    if attempts >= max_attempts {
                        warn!(
                            url = %request.url,
                            attempts,
                            "Lookup failed: retries exhausted"
                        );
                        metrics::lookup::exhausted();
                        return LookupOutcome::Exhausted { attempts };
                    }
                    info!(
                        url = %request.url,
                        attempt = attempts,
                        max_attempts,
                        backoff_secs = self.policy.backoff.as_secs_f64(),
                        "Rate limited, retrying"
                    );
                }
                ResponseClass::Failure => {
                    warn!(url = %request.url, status = response.status, "Lookup failed");
                    metrics::lookup::failed();
                    return LookupOutcome::Failed {
                        status: Some(response.status),
                        reason: format!("HTTP {}", response.status),
                    };
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn setup(responses: Vec<std::result::Result<HttpResponse, String>>, max_attempts: u32) -> (Arc<ScriptedHttp>, Arc<RecordingSleeper>, LookupClient) {
        let http = Arc::new(ScriptedHttp::new(responses));
        let sleeper = Arc::new(RecordingSleeper::default());
        let lookup = client(http.clone(), sleeper.clone(), max_attempts);
        (http, sleeper, lookup)
    }

    #[test]
    fn test_response_classification() {
        assert_eq!(ResponseClass::of(200), ResponseClass::Success);
        assert_eq!(ResponseClass::of(204), ResponseClass::Success);
        assert_eq!(ResponseClass::of(429), ResponseClass::RateLimited);
        assert_eq!(ResponseClass::of(404), ResponseClass::Failure);
        assert_eq!(ResponseClass::of(503), ResponseClass::Failure);
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let (http, sleeper, lookup) = setup(vec![body("ok")], 3);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert_eq!(outcome.into_option().unwrap().text(), "ok");
        assert_eq!(http.calls(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let (http, sleeper, lookup) = setup(vec![status(429), status(429), body("ok")], 3);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert!(outcome.is_success());
        assert_eq!(http.calls(), 3);
        assert_eq!(*sleeper.sleeps.lock().unwrap(), vec![Duration::from_secs(10); 2]);
    }

    #[tokio::test]
    async fn test_three_backoffs_then_success_with_larger_budget() {
        let (http, sleeper, lookup) = setup(vec![status(429), status(429), status(429), body("payload")], 4);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert_eq!(outcome.into_option().unwrap().text(), "payload");
        assert_eq!(http.calls(), 4);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_three_rate_limits_exhaust_default_budget() {
        let (http, sleeper, lookup) = setup(vec![status(429), status(429), status(429), body("never")], 3);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert_eq!(outcome, LookupOutcome::Exhausted { attempts: 3 });
        assert_eq!(http.calls(), 3);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (http, sleeper, lookup) = setup(vec![status(404), body("never")], 3);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert_eq!(
            outcome,
            LookupOutcome::Failed { status: Some(404), reason: "HTTP 404".to_string() }
        );
        assert_eq!(http.calls(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_after_rate_limit_stops_immediately() {
        let (http, sleeper, lookup) = setup(vec![status(429), status(500)], 3);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert!(matches!(outcome, LookupOutcome::Failed { status: Some(500), .. }));
        assert_eq!(http.calls(), 2);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_a_failure_not_a_panic() {
        let (_, _, lookup) = setup(vec![Err("connection reset".to_string())], 3);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert_eq!(
            outcome,
            LookupOutcome::Failed { status: None, reason: "connection reset".to_string() }
        );
    }

    #[tokio::test]
    async fn test_zero_budget_still_makes_one_attempt() {
        let (http, _, lookup) = setup(vec![status(429)], 0);
        let outcome = lookup.execute(&HttpRequest::get("https://example.com")).await;
        assert_eq!(outcome, LookupOutcome::Exhausted { attempts: 1 });
        assert_eq!(http.calls(), 1);
    }

    #[test]
    fn test_outcome_map_preserves_terminal_state() {
        let exhausted: LookupOutcome<u8> = LookupOutcome::Exhausted { attempts: 3 };
        assert_eq!(exhausted.map(|v| v + 1), LookupOutcome::Exhausted { attempts: 3 });
        assert_eq!(LookupOutcome::Succeeded(1u8).map(|v| v + 1), LookupOutcome::Succeeded(2));
    }
}
