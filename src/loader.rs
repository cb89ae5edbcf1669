//! Report loading
//!
//! A [`ReportLoader`] owns one fetch of an evaluation report. Mounting it
//! spawns exactly one task on the current tokio runtime; the loader's state
//! then moves from [`LoadState::NotLoaded`] to either `Loaded` or `Failed`
//! and stays there. Nothing is retried.
//!
//! ```text
//!            fetch ok
//! NotLoaded ───────────► Loaded(report)
//!     │
//!     └─────────────────► Failed(reason)
//!      transport / status / timeout / malformed
//! ```
//!
//! Unmounting (or dropping) the loader clears its liveness token and aborts
//! the task; a response that still arrives afterwards is discarded.

use crate::config::LoaderConfig;
use crate::evaluation::{EvaluationReport, ReportError};
use crate::records;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Where a report comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    /// `GET` an evaluation-report endpoint
    Url(String),
    /// Precomputed report JSON on disk
    File(PathBuf),
    /// Raw evaluation records (`.jsonl` file or directory) to aggregate
    Records(PathBuf),
}

impl ReportSource {
    pub fn parse(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return ReportSource::Url(s.to_string());
        }
        let path = PathBuf::from(s);
        if records::is_record_source(&path) {
            ReportSource::Records(path)
        } else {
            ReportSource::File(path)
        }
    }
}

impl std::fmt::Display for ReportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportSource::Url(url) => write!(f, "{}", url),
            ReportSource::File(p) => write!(f, "{}", p.display()),
            ReportSource::Records(p) => write!(f, "{} (records)", p.display()),
        }
    }
}

/// Why a load failed
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Connection refused, DNS, TLS, reset...
    Transport(String),
    /// Non-2xx response
    Status(u16),
    /// Body is not JSON
    Decode(String),
    Timeout(Duration),
    Io(String),
    /// JSON that is not an evaluation report
    Malformed(String),
}

/// Coarse failure classes shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unavailable,
    Malformed,
}

impl LoadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LoadError::Malformed(_) => FailureKind::Malformed,
            _ => FailureKind::Unavailable,
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Transport(msg) => write!(f, "request failed: {}", msg),
            LoadError::Status(code) => write!(f, "endpoint returned HTTP {}", code),
            LoadError::Decode(msg) => write!(f, "response is not JSON: {}", msg),
            LoadError::Timeout(d) => write!(f, "no response within {:.1}s", d.as_secs_f64()),
            LoadError::Io(msg) => write!(f, "{}", msg),
            LoadError::Malformed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<ReportError> for LoadError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Json(e) => LoadError::Decode(e.to_string()),
            other => LoadError::Malformed(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(e: reqwest::Error) -> Self {
        LoadError::Transport(e.to_string())
    }
}

impl From<records::RecordsError> for LoadError {
    fn from(e: records::RecordsError) -> Self {
        match e {
            records::RecordsError::Parse { .. } => LoadError::Malformed(e.to_string()),
            other => LoadError::Io(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Loader state for one mount
#[derive(Debug, Clone, Default)]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loaded(Arc<EvaluationReport>),
    Failed(LoadError),
}

impl LoadState {
    /// Apply the completion of the fetch. Only `NotLoaded` moves; the other
    /// states are final for the mount.
    pub fn apply(self, outcome: Result<EvaluationReport>) -> LoadState {
        match self {
            LoadState::NotLoaded => match outcome {
                Ok(report) => LoadState::Loaded(Arc::new(report)),
                Err(e) => LoadState::Failed(e),
            },
            settled => settled,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, LoadState::NotLoaded)
    }

    pub fn report(&self) -> Option<&Arc<EvaluationReport>> {
        match self {
            LoadState::Loaded(r) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadState::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Liveness flag shared between a loader and its task
#[derive(Debug, Clone)]
pub struct MountToken(Arc<AtomicBool>);

impl MountToken {
    pub fn new() -> Self {
        MountToken(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for MountToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReportLoader {
    source: ReportSource,
    state: watch::Receiver<LoadState>,
    token: MountToken,
    task: JoinHandle<()>,
}

impl ReportLoader {
    /// Start the single fetch for this mount. Must be called inside a tokio
    /// runtime.
    pub fn mount(source: ReportSource, config: &LoaderConfig) -> Self {
        let (tx, rx) = watch::channel(LoadState::NotLoaded);
        let token = MountToken::new();

        let task = tokio::spawn(run(source.clone(), config.clone(), token.clone(), tx));
        tracing::info!(source = %source, "report fetch started");

        ReportLoader { source, state: rx, token, task }
    }

    pub fn source(&self) -> &ReportSource {
        &self.source
    }

    /// Snapshot of the current state
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Wait until the fetch has resolved one way or the other
    pub async fn settled(&mut self) -> LoadState {
        let settled = self.state.wait_for(|s| !s.is_pending()).await.map(|s| s.clone());
        match settled {
            Ok(state) => state,
            // Task gone without resolving (unmounted)
            Err(_) => self.state.borrow().clone(),
        }
    }

    pub fn unmount(&self) {
        self.token.revoke();
        self.task.abort();
    }

    pub fn is_mounted(&self) -> bool {
        self.token.is_live()
    }
}

impl Drop for ReportLoader {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn run(source: ReportSource, config: LoaderConfig, token: MountToken, tx: watch::Sender<LoadState>) {
    let outcome = match tokio::time::timeout(config.timeout, fetch(&source, &config)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(LoadError::Timeout(config.timeout)),
    };

    match &outcome {
        Ok(report) => tracing::info!(
            source = %source,
            videos = report.total_statistics.total_videos,
            tags = report.tag_count(),
            "report loaded"
        ),
        Err(e) => tracing::error!(source = %source, error = %e, "failed to load evaluation report"),
    }

    if !token.is_live() {
        tracing::debug!(source = %source, "loader unmounted, discarding response");
        return;
    }

    tx.send_modify(|state| {
        let current = std::mem::take(state);
        *state = current.apply(outcome);
    });
}

/// Fetch and validate a report from any source
pub async fn fetch(source: &ReportSource, config: &LoaderConfig) -> Result<EvaluationReport> {
    match source {
        ReportSource::Url(url) => fetch_url(url, config.timeout).await,
        ReportSource::File(path) => {
            let body = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| LoadError::Io(format!("failed to read {}: {}", path.display(), e)))?;
            Ok(EvaluationReport::from_json(&body)?)
        }
        ReportSource::Records(path) => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || records::build_report(path))
                .await
                .map_err(|e| LoadError::Io(e.to_string()))?
                .map_err(LoadError::from)
        }
    }
}

async fn fetch_url(url: &str, timeout: Duration) -> Result<EvaluationReport> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if is_loopback(url) {
        builder = builder.no_proxy();
    }
    let client = builder.build()?;

    let response = client.get(url).send().await.map_err(|e| classify(e, timeout))?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Status(status.as_u16()));
    }

    let body = response.text().await.map_err(|e| classify(e, timeout))?;
    Ok(EvaluationReport::from_json(&body)?)
}

/// Local endpoints are never sent through a system proxy
fn is_loopback(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| {
            host == "localhost"
                || host
                    .trim_matches(|c| c == '[' || c == ']')
                    .parse::<std::net::IpAddr>()
                    .map(|ip| ip.is_loopback())
                    .unwrap_or(false)
        })
        .unwrap_or(false)
}

fn classify(e: reqwest::Error, timeout: Duration) -> LoadError {
    if e.is_timeout() {
        LoadError::Timeout(timeout)
    } else {
        LoadError::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_http::{Header, Response, Server};

    const VALID: &str = r#"{
        "total_statistics": {"total_videos": 10, "total_tags": 100,
                             "correct_tags": 80, "wrong_tags": 15, "missed_tags": 5},
        "tag_statistics": {"cat": {"total": 10, "correct": 9, "wrong": 1, "missed": 0}}
    }"#;

    /// Serve a single canned response on an ephemeral port, optionally after
    /// a delay. Returns the endpoint URL.
    fn one_shot_server(status: u16, body: &'static str, delay: Duration) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                std::thread::sleep(delay);
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap());
                let _ = request.respond(response);
            }
        });
        format!("http://127.0.0.1:{}/api/evaluation-report", port)
    }

    fn config(timeout_ms: u64) -> LoaderConfig {
        LoaderConfig { timeout: Duration::from_millis(timeout_ms) }
    }

    // ==========================================================================
    // STATE MACHINE TESTS
    // ==========================================================================

    #[test]
    fn test_apply_success() {
        let state = LoadState::NotLoaded.apply(Ok(EvaluationReport::default()));
        assert!(state.report().is_some());
    }

    #[test]
    fn test_apply_failure() {
        let state = LoadState::NotLoaded.apply(Err(LoadError::Status(500)));
        assert_eq!(state.error(), Some(&LoadError::Status(500)));
    }

    #[test]
    fn test_settled_states_are_terminal() {
        let failed = LoadState::Failed(LoadError::Status(404)).apply(Ok(EvaluationReport::default()));
        assert!(failed.error().is_some());

        let loaded = LoadState::Loaded(Arc::new(EvaluationReport::default()))
            .apply(Err(LoadError::Status(500)));
        assert!(loaded.report().is_some());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(LoadError::Status(503).kind(), FailureKind::Unavailable);
        assert_eq!(LoadError::Decode("x".into()).kind(), FailureKind::Unavailable);
        assert_eq!(LoadError::Timeout(Duration::from_secs(1)).kind(), FailureKind::Unavailable);
        assert_eq!(LoadError::Malformed("x".into()).kind(), FailureKind::Malformed);
    }

    #[test]
    fn test_report_error_mapping() {
        let not_json = EvaluationReport::from_json("oops").unwrap_err();
        assert!(matches!(LoadError::from(not_json), LoadError::Decode(_)));

        let no_tags = EvaluationReport::from_json(r#"{"total_statistics": {}}"#).unwrap_err();
        assert!(matches!(LoadError::from(no_tags), LoadError::Malformed(_)));
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!(
            ReportSource::parse("http://localhost:3002/api/evaluation-report"),
            ReportSource::Url("http://localhost:3002/api/evaluation-report".to_string())
        );
        assert!(matches!(ReportSource::parse("HTTPS://example.com/r"), ReportSource::Url(_)));
        assert_eq!(
            ReportSource::parse("statistics_report.json"),
            ReportSource::File(PathBuf::from("statistics_report.json"))
        );
        assert_eq!(
            ReportSource::parse("evaluation_records.jsonl"),
            ReportSource::Records(PathBuf::from("evaluation_records.jsonl"))
        );
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("http://127.0.0.1:3002/api/evaluation-report"));
        assert!(is_loopback("http://localhost/x"));
        assert!(is_loopback("http://[::1]:8080/"));
        assert!(!is_loopback("https://example.com/report"));
        assert!(!is_loopback("not a url"));
    }

    #[test]
    fn test_mount_token() {
        let token = MountToken::new();
        let shared = token.clone();
        assert!(shared.is_live());
        token.revoke();
        assert!(!shared.is_live());
    }

    // ==========================================================================
    // FETCH LIFECYCLE TESTS
    // ==========================================================================
    //
    // Each test stands up a one-request tiny_http server and mounts a loader
    // against it.
    // ==========================================================================

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_success() {
        let url = one_shot_server(200, VALID, Duration::ZERO);
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        let state = loader.settled().await;
        let report = state.report().expect("report should load");
        assert_eq!(report.total_statistics.correct_tags, 80);
        assert!(loader.state().report().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_placeholder_state_before_resolution() {
        let url = one_shot_server(200, VALID, Duration::from_millis(300));
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        assert!(loader.state().is_pending());
        assert!(loader.settled().await.report().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_error_status_fails() {
        let url = one_shot_server(500, "internal error", Duration::ZERO);
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        let state = loader.settled().await;
        assert_eq!(state.error(), Some(&LoadError::Status(500)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_json_body_fails() {
        let url = one_shot_server(200, "<html>gateway</html>", Duration::ZERO);
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        let state = loader.settled().await;
        assert!(matches!(state.error(), Some(LoadError::Decode(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_report_fails() {
        let url = one_shot_server(200, r#"{"total_statistics": {}}"#, Duration::ZERO);
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        let state = loader.settled().await;
        assert_eq!(state.error().map(LoadError::kind), Some(FailureKind::Malformed));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_connection_refused_fails() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/api/evaluation-report", port);
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        let state = loader.settled().await;
        assert!(!state.is_pending(), "transport failure must not leave the loader spinning");
        assert_eq!(state.error().map(LoadError::kind), Some(FailureKind::Unavailable));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_fails() {
        let url = one_shot_server(200, VALID, Duration::from_secs(3));
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(200));

        let state = loader.settled().await;
        assert!(matches!(state.error(), Some(LoadError::Timeout(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unmount_discards_late_response() {
        let url = one_shot_server(200, VALID, Duration::from_millis(200));
        let mut loader = ReportLoader::mount(ReportSource::Url(url), &config(5_000));

        loader.unmount();
        assert!(!loader.is_mounted());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(loader.state().is_pending());
        assert!(loader.settled().await.is_pending());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_source() {
        let path = std::env::temp_dir().join(format!("evalchart-loader-{}.json", std::process::id()));
        std::fs::write(&path, VALID).unwrap();

        let mut loader = ReportLoader::mount(ReportSource::File(path.clone()), &config(5_000));
        let state = loader.settled().await;
        assert_eq!(state.report().map(|r| r.tag_count()), Some(1));

        std::fs::remove_file(path).ok();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_file_fails() {
        let source = ReportSource::File(PathBuf::from("/no/such/report.json"));
        let mut loader = ReportLoader::mount(source, &config(5_000));
        assert!(matches!(loader.settled().await.error(), Some(LoadError::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_source() {
        let path = std::env::temp_dir().join(format!("evalchart-loader-{}.jsonl", std::process::id()));
        std::fs::write(
            &path,
            r#"{"original_tags": ["cat"], "evaluation_results": {"total_tags": 1, "correct_tags": 1}}"#,
        )
        .unwrap();

        let mut loader = ReportLoader::mount(ReportSource::parse(path.to_str().unwrap()), &config(5_000));
        let state = loader.settled().await;
        let report = state.report().expect("records should aggregate");
        assert_eq!(report.total_statistics.total_videos, 1);
        assert_eq!(report.tag_statistics["cat"].correct, 1);

        std::fs::remove_file(path).ok();
    }
}
