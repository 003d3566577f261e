//! Classification service client
//!
//! [`HttpClassifier`] submits a publicly fetchable image URL to a hosted
//! image-classification API and turns its answer into a validated
//! [`ModerationRawResult`]. Each call makes exactly one outbound request and
//! never retries.
//!
//! # Failure mapping
//!
//! | Signal | Error |
//! |--------|-------|
//! | Missing credentials (no request sent) | `NotConfigured` |
//! | HTTP 401/403, or an authentication message | `InvalidCredentials` |
//! | HTTP 429, or a quota/rate-limit message | `QuotaExceeded` |
//! | Anything else, including timeouts | `ClassificationUnavailable` |
//! | Unparseable body, no scores, scores outside `[0, 1]` | `ContractViolation` |

use super::types::{Category, ClassificationError, ModerationRawResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Default classification endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.sightengine.com/1.0/check.json";

/// Default transport timeout for one classification request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const AUTH_KEYWORDS: &[&str] = &[
    "unauthorized",
    "authentication",
    "credentials",
    "api_user",
    "api_secret",
    "invalid key",
];

const QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "rate limit",
    "rate-limit",
    "too many requests",
    "usage limit",
];

const NOT_CONFIGURED_HINT: &str = "set moderation.api_user and moderation.api_secret \
     (or TALEFORGE_MODERATION__API_USER and TALEFORGE_MODERATION__API_SECRET)";

// Keeps echoed response bodies in error messages readable.
const MAX_DETAIL_LEN: usize = 200;

/// API credential pair for the classification service
#[derive(Clone, PartialEq, Eq)]
pub struct ClassifierCredentials {
    api_user: String,
    api_secret: String,
}

impl ClassifierCredentials {
    /// Creates a credential pair
    #[must_use]
    pub fn new(api_user: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_user: api_user.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Returns the API user
    #[must_use]
    pub fn api_user(&self) -> &str {
        &self.api_user
    }

    fn is_complete(&self) -> bool {
        !self.api_user.trim().is_empty() && !self.api_secret.trim().is_empty()
    }
}

impl fmt::Debug for ClassifierCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierCredentials")
            .field("api_user", &self.api_user)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Settings for [`HttpClassifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Credential pair; `None` leaves the classifier unconfigured
    pub credentials: Option<ClassifierCredentials>,

    /// Full URL of the check endpoint
    pub endpoint: String,

    /// Transport timeout for one request
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClassifierConfig {
    /// Creates a configuration with credentials and default endpoint/timeout
    #[must_use]
    pub fn new(credentials: ClassifierCredentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    /// Overrides the endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Overrides the transport timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Classifies an image reachable at a URL
///
/// # Implementation Requirements
///
/// Implementations must:
/// - Make at most one outbound request per call
/// - Never retry internally
/// - Return only validated scores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Scores the image at `image_url` in every supported category
    ///
    /// # Errors
    ///
    /// Returns a `ClassificationError` describing why no scores are available
    async fn classify(&self, image_url: &str) -> Result<ModerationRawResult, ClassificationError>;

    /// Returns the name of the classifier, for logs
    fn name(&self) -> &'static str;
}

/// HTTP client for the hosted classification API
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: Client,
    config: ClassifierConfig,
}

impl HttpClassifier {
    /// Creates a classifier with its own HTTP client
    ///
    /// Missing credentials are not an error here; they surface as
    /// `NotConfigured` on the first [`classify`](ImageClassifier::classify).
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::ClassificationUnavailable` if the HTTP
    /// client cannot be built
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassificationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassificationError::ClassificationUnavailable(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a classifier sharing an existing HTTP client
    ///
    /// The client's own timeout applies; `config.timeout` is ignored.
    #[must_use]
    pub const fn with_client(client: Client, config: ClassifierConfig) -> Self {
        Self { client, config }
    }

    /// Whether a complete credential pair is configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config
            .credentials
            .as_ref()
            .is_some_and(ClassifierCredentials::is_complete)
    }
}

/// Comma-separated model list, in the fixed order the service expects
#[must_use]
pub fn models() -> String {
    Category::ALL.map(Category::model).join(",")
}

#[async_trait]
impl ImageClassifier for HttpClassifier {
    async fn classify(&self, image_url: &str) -> Result<ModerationRawResult, ClassificationError> {
        let credentials = self
            .config
            .credentials
            .as_ref()
            .filter(|credentials| credentials.is_complete())
            .ok_or_else(|| ClassificationError::NotConfigured {
                hint: NOT_CONFIGURED_HINT.to_string(),
            })?;

        let models = models();
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("url", image_url),
                ("models", models.as_str()),
                ("api_user", credentials.api_user.as_str()),
                ("api_secret", credentials.api_secret.as_str()),
            ])
            .send()
            .await
            // The request URL carries the secret.
            .map_err(|e| ClassificationError::ClassificationUnavailable(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassificationError::ClassificationUnavailable(e.without_url().to_string()))?;

        if !status.is_success() {
            let error = classify_failure(Some(status), &body);
            tracing::debug!(%status, error = %error, "classification request failed");
            return Err(error);
        }

        parse_response(&body)
    }

    fn name(&self) -> &'static str {
        "HTTP Classifier"
    }
}

/// Maps a failed classification response to an error
///
/// `status` is `None` when the failure was reported in a 200 body without a
/// usable HTTP status code.
///
/// # Examples
///
/// ```rust
/// use reqwest::StatusCode;
/// use taleforge::moderation::{classify_failure, ClassificationError};
///
/// assert!(matches!(
///     classify_failure(Some(StatusCode::TOO_MANY_REQUESTS), ""),
///     ClassificationError::QuotaExceeded(_)
/// ));
/// assert!(matches!(
///     classify_failure(None, "Incorrect credentials"),
///     ClassificationError::InvalidCredentials(_)
/// ));
/// ```
#[must_use]
pub fn classify_failure(status: Option<StatusCode>, body: &str) -> ClassificationError {
    let lowered = body.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));

    let detail = match status {
        Some(status) => format!("HTTP {status}: {}", truncate(body)),
        None => truncate(body),
    };

    match status {
        Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            ClassificationError::InvalidCredentials(detail)
        }
        Some(StatusCode::TOO_MANY_REQUESTS) => ClassificationError::QuotaExceeded(detail),
        _ if mentions(AUTH_KEYWORDS) => ClassificationError::InvalidCredentials(detail),
        _ if mentions(QUOTA_KEYWORDS) => ClassificationError::QuotaExceeded(detail),
        _ => ClassificationError::ClassificationUnavailable(detail),
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Score {
    Bare(f64),
    Prob { prob: f64 },
}

impl Score {
    const fn value(&self) -> f64 {
        match self {
            Self::Bare(value) | Self::Prob { prob: value } => *value,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NudityScore {
    Bare(f64),
    Detailed {
        #[serde(alias = "explicit")]
        raw: Option<f64>,
        partial: Option<f64>,
        prob: Option<f64>,
    },
}

#[derive(Debug, Deserialize)]
struct FailureDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    status: Option<String>,
    error: Option<FailureDetail>,
    nudity: Option<NudityScore>,
    weapon: Option<Score>,
    gore: Option<Score>,
    offensive: Option<Score>,
    recreational_drug: Option<Score>,
}

fn unit_interval(category: Category, value: f64) -> Result<f64, ClassificationError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ClassificationError::ContractViolation(format!(
            "{category} score {value} is outside [0, 1]"
        )))
    }
}

impl NudityScore {
    /// Explicit and partial nudity merge conservatively: the higher one wins.
    fn merged(&self) -> Result<f64, ClassificationError> {
        match self {
            Self::Bare(value) => unit_interval(Category::Nudity, *value),
            Self::Detailed { raw, partial, prob } => {
                let sub_scores = [*raw, *partial]
                    .into_iter()
                    .flatten()
                    .map(|value| unit_interval(Category::Nudity, value))
                    .collect::<Result<Vec<_>, _>>()?;

                match (sub_scores.into_iter().reduce(f64::max), prob) {
                    (Some(merged), _) => Ok(merged),
                    (None, Some(prob)) => unit_interval(Category::Nudity, *prob),
                    (None, None) => Err(ClassificationError::ContractViolation(
                        "nudity reported without scores".to_string(),
                    )),
                }
            }
        }
    }
}

fn failure_status(code: Option<i64>) -> Option<StatusCode> {
    code.and_then(|code| u16::try_from(code).ok())
        .filter(|code| (100..=599).contains(code))
        .and_then(|code| StatusCode::from_u16(code).ok())
}

/// Parses a successful (HTTP 2xx) response body
///
/// # Errors
///
/// - A `"status": "failure"` body maps through [`classify_failure`]
/// - Anything unparseable or out of range is a `ContractViolation`
pub fn parse_response(body: &str) -> Result<ModerationRawResult, ClassificationError> {
    let response: CheckResponse = serde_json::from_str(body).map_err(|e| {
        ClassificationError::ContractViolation(format!("unparseable response: {e}"))
    })?;

    if response.status.as_deref() == Some("failure") {
        let (status, message) = response.error.map_or((None, String::new()), |error| {
            let message = [error.kind, error.message]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(": ");
            (failure_status(error.code), message)
        });
        let message = if message.is_empty() { body.to_string() } else { message };
        return Err(classify_failure(status, &message));
    }

    let mut scores = Vec::with_capacity(Category::ALL.len());
    if let Some(nudity) = &response.nudity {
        scores.push((Category::Nudity, nudity.merged()?));
    }
    for (category, score) in [
        (Category::Weapons, &response.weapon),
        (Category::Gore, &response.gore),
        (Category::Offensive, &response.offensive),
        (Category::Drugs, &response.recreational_drug),
    ] {
        if let Some(score) = score {
            scores.push((category, score.value()));
        }
    }

    ModerationRawResult::from_scores(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SAFE_BODY: &str = r#"{
        "status": "success",
        "nudity": {"raw": 0.01, "partial": 0.02},
        "weapon": 0.01,
        "gore": {"prob": 0.01},
        "offensive": {"prob": 0.02},
        "recreational_drug": {"prob": 0.0}
    }"#;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/check.json")
    }

    fn classifier(endpoint: &str) -> HttpClassifier {
        HttpClassifier::new(
            ClassifierConfig::new(ClassifierCredentials::new("user", "s3cret"))
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_models_are_in_fixed_order() {
        assert_eq!(models(), "nudity,weapon,gore,offensive,recreational_drug");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let debug = format!("{:?}", ClassifierCredentials::new("user", "s3cret"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_parse_safe_body() {
        let raw = parse_response(SAFE_BODY).unwrap();
        assert_eq!(raw.scores().len(), 5);
        assert_eq!(raw.score(Category::Weapons), Some(0.01));
        assert_eq!(raw.score(Category::Nudity), Some(0.02));
    }

    #[test]
    fn test_nudity_merges_conservatively() {
        let raw = parse_response(r#"{"status":"success","nudity":{"raw":0.2,"partial":0.6}}"#).unwrap();
        assert_eq!(raw.score(Category::Nudity), Some(0.6));

        let raw = parse_response(r#"{"status":"success","nudity":{"explicit":0.7,"partial":0.1}}"#).unwrap();
        assert_eq!(raw.score(Category::Nudity), Some(0.7));

        let raw = parse_response(r#"{"status":"success","nudity":{"partial":0.3}}"#).unwrap();
        assert_eq!(raw.score(Category::Nudity), Some(0.3));
    }

    #[test]
    fn test_absent_categories_are_omitted() {
        let raw = parse_response(r#"{"status":"success","gore":{"prob":0.4}}"#).unwrap();
        assert_eq!(raw.scores().len(), 1);
        assert_eq!(raw.score(Category::Drugs), None);
    }

    #[test]
    fn test_contract_violations() {
        for body in [
            "not json",
            r#"{"status":"success"}"#,
            r#"{"status":"success","weapon":1.5}"#,
            r#"{"status":"success","nudity":{"raw":-0.5,"partial":0.2}}"#,
            r#"{"status":"success","nudity":{}}"#,
            r#"{"status":"success","gore":"high"}"#,
        ] {
            assert!(
                matches!(parse_response(body), Err(ClassificationError::ContractViolation(_))),
                "{body} should be a contract violation"
            );
        }
    }

    #[test]
    fn test_failure_body_uses_keyword_rules() {
        let body = r#"{"status":"failure","error":{"type":"credentials_error","code":1,"message":"Incorrect API user or API secret"}}"#;
        assert!(matches!(parse_response(body), Err(ClassificationError::InvalidCredentials(_))));

        let body = r#"{"status":"failure","error":{"type":"usage_limit","code":32,"message":"Daily usage limit reached"}}"#;
        assert!(matches!(parse_response(body), Err(ClassificationError::QuotaExceeded(_))));

        let body = r#"{"status":"failure","error":{"type":"media_error","code":503,"message":"Temporary error"}}"#;
        assert!(matches!(
            parse_response(body),
            Err(ClassificationError::ClassificationUnavailable(_))
        ));

        let body = r#"{"status":"failure","error":{"type":"x","code":429,"message":"slow down"}}"#;
        assert!(matches!(parse_response(body), Err(ClassificationError::QuotaExceeded(_))));
    }

    #[test]
    fn test_classify_failure_by_status() {
        assert!(matches!(
            classify_failure(Some(StatusCode::UNAUTHORIZED), ""),
            ClassificationError::InvalidCredentials(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::FORBIDDEN), "nope"),
            ClassificationError::InvalidCredentials(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::TOO_MANY_REQUESTS), ""),
            ClassificationError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::BAD_GATEWAY), "upstream"),
            ClassificationError::ClassificationUnavailable(_)
        ));
    }

    #[test]
    fn test_classify_failure_by_keyword() {
        assert!(matches!(
            classify_failure(Some(StatusCode::BAD_REQUEST), "Invalid key supplied"),
            ClassificationError::InvalidCredentials(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::BAD_REQUEST), "Monthly QUOTA exhausted"),
            ClassificationError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_failure(None, "rate-limit hit"),
            ClassificationError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn test_failure_detail_is_truncated() {
        let long = "x".repeat(1000);
        let ClassificationError::ClassificationUnavailable(detail) = classify_failure(None, &long) else {
            panic!("expected ClassificationUnavailable");
        };
        assert!(detail.len() < 300);
        assert!(detail.ends_with("..."));
    }

    #[tokio::test]
    async fn test_not_configured_sends_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let endpoint = spawn(Router::new().route(
            "/check.json",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { SAFE_BODY }
            }),
        ))
        .await;

        for config in [
            ClassifierConfig::default().with_endpoint(&endpoint),
            ClassifierConfig::new(ClassifierCredentials::new("user", "  ")).with_endpoint(&endpoint),
        ] {
            let classifier = HttpClassifier::new(config).unwrap();
            assert!(!classifier.is_configured());

            match classifier.classify("https://cdn.example/a.png").await {
                Err(ClassificationError::NotConfigured { hint }) => assert!(hint.contains("api_secret")),
                other => panic!("expected NotConfigured, got {other:?}"),
            }
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classify_sends_expected_query() {
        let endpoint = spawn(Router::new().route(
            "/check.json",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let expected = [
                    ("url", "https://cdn.example/a.png"),
                    ("models", "nudity,weapon,gore,offensive,recreational_drug"),
                    ("api_user", "user"),
                    ("api_secret", "s3cret"),
                ];
                if expected
                    .iter()
                    .all(|(key, value)| params.get(*key).map(String::as_str) == Some(*value))
                {
                    Ok(SAFE_BODY)
                } else {
                    Err(AxumStatus::BAD_REQUEST)
                }
            }),
        ))
        .await;

        let raw = classifier(&endpoint)
            .classify("https://cdn.example/a.png")
            .await
            .unwrap();
        assert_eq!(raw.scores().len(), 5);
    }

    #[tokio::test]
    async fn test_http_errors_are_mapped() {
        let cases = [
            (AxumStatus::UNAUTHORIZED, "denied"),
            (AxumStatus::TOO_MANY_REQUESTS, "slow down"),
            (AxumStatus::INTERNAL_SERVER_ERROR, "oops"),
        ];

        let mut results = Vec::new();
        for (status, body) in cases {
            let endpoint = spawn(Router::new().route("/check.json", get(move || async move { (status, body) }))).await;
            results.push(classifier(&endpoint).classify("https://cdn.example/a.png").await);
        }

        assert!(matches!(results[0], Err(ClassificationError::InvalidCredentials(_))));
        assert!(matches!(results[1], Err(ClassificationError::QuotaExceeded(_))));
        assert!(matches!(results[2], Err(ClassificationError::ClassificationUnavailable(_))));
    }

    #[tokio::test]
    async fn test_failure_body_with_200_is_mapped() {
        let endpoint = spawn(Router::new().route(
            "/check.json",
            get(|| async {
                Json(json!({
                    "status": "failure",
                    "error": {"type": "rate_limit", "code": 33, "message": "Too many requests"}
                }))
            }),
        ))
        .await;

        let result = classifier(&endpoint).classify("https://cdn.example/a.png").await;
        assert!(matches!(result, Err(ClassificationError::QuotaExceeded(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let endpoint = spawn(Router::new().route(
            "/check.json",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(Value::Null)
            }),
        ))
        .await;

        let classifier = HttpClassifier::new(
            ClassifierConfig::new(ClassifierCredentials::new("user", "s3cret"))
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_millis(200)),
        )
        .unwrap();

        match classifier.classify("https://cdn.example/a.png").await {
            Err(ClassificationError::ClassificationUnavailable(detail)) => {
                assert!(!detail.contains("s3cret"));
            }
            other => panic!("expected ClassificationUnavailable, got {other:?}"),
        }
    }
}
