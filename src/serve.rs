//! HTTP server for interactive mode
//!
//! `evalchart serve <SOURCE>` → mounts a loader, starts server, opens browser

use crate::config::DEFAULT_ENDPOINT_PATH;
use crate::loader::{LoadState, ReportLoader};
use crate::report::html::{self, PageOptions};
use crate::view::ReportView;
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server};

const DEFAULT_REFRESH_SECS: u32 = 1;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    fn failure(error: String) -> Self {
        Self { ok: false, data: None, error: Some(error) }
    }
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct PageParams {
    /// Seconds between reloads while the report is still loading
    pub refresh: Option<u32>,
}

/// Serve the loader's report until the process is stopped. The loader's
/// fetch runs on its tokio runtime while this thread handles requests.
pub fn start(port: u16, loader: ReportLoader, open_browser: bool) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let url = format!("http://localhost:{}", port);

    eprintln!("\n\x1b[1;32mevalchart\x1b[0m");
    eprintln!("   {}", url);
    eprintln!("   Report:   {}{}", url, DEFAULT_ENDPOINT_PATH);
    eprintln!("   Source:   {}\n", loader.source());

    if open_browser {
        let _ = open::that(&url);
    }

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &loader) {
            tracing::warn!(error = %e, "failed to answer request");
        }
    }

    Ok(())
}

fn handle_request(request: Request, loader: &ReportLoader) -> std::io::Result<()> {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/");
    let query = url.split('?').nth(1).unwrap_or("");
    let method = request.method().clone();
    tracing::debug!(%method, %url, "request");

    let state = loader.state();

    match (&method, path) {
        // Page for the current loader state
        (&Method::Get, "/") => {
            let params = parse_params(query);
            let mut body = Vec::new();
            html::write_state(&mut body, &state, &page_options(&params))?;
            let response = Response::from_data(body).with_header(content_type("text/html; charset=utf-8"));
            request.respond(response)
        }

        // Raw report, for other loaders
        (&Method::Get, DEFAULT_ENDPOINT_PATH) => match &state {
            LoadState::Loaded(report) => {
                let json = serde_json::to_string(report.as_ref())?;
                request.respond(Response::from_string(json).with_header(content_type("application/json")))
            }
            other => {
                let message = unavailable_message(other);
                let response = Response::from_string(message).with_status_code(503);
                request.respond(response)
            }
        },

        // API: derived chart datasets
        (&Method::Get, "/api/view") => {
            let (status, json) = match &state {
                LoadState::Loaded(report) => {
                    let view = ReportView::from_report(report);
                    (200, serde_json::to_string(&ApiResponse::success(view))?)
                }
                other => (
                    503,
                    serde_json::to_string(&ApiResponse::<ReportView>::failure(unavailable_message(other)))?,
                ),
            };
            let response = Response::from_string(json)
                .with_status_code(status)
                .with_header(content_type("application/json"));
            request.respond(response)
        }

        // 404
        _ => {
            let response = Response::from_string("Not found").with_status_code(404);
            request.respond(response)
        }
    }
}

fn parse_params(query: &str) -> PageParams {
    serde_urlencoded::from_str::<PageParams>(query).unwrap_or_default()
}

fn page_options(params: &PageParams) -> PageOptions {
    PageOptions {
        refresh_secs: Some(params.refresh.filter(|&s| s > 0).unwrap_or(DEFAULT_REFRESH_SECS)),
    }
}

fn unavailable_message(state: &LoadState) -> String {
    match state {
        LoadState::NotLoaded => "report is still loading".to_string(),
        LoadState::Failed(e) => format!("report unavailable: {}", e),
        LoadState::Loaded(_) => String::new(),
    }
}

fn content_type(value: &str) -> Header {
    // Static header names and ASCII values always parse
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).unwrap()
}
