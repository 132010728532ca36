// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! The HTTP API: take lookup/listing/correction, recording start/stop, and export.
//!
//! Routing is a hand-decoded `Path` enum rather than a router crate — the route set is
//! small and fixed, and matching it directly keeps every handler's precondition (which
//! path shape implies which path parameters exist) visible at the match site.

use crate::json::{
    ErrorDto, ExportByDateRequest, ExportFailureDto, ExportResponseDto, ExportSelectionRequest,
    RecordingActionResponse, RecordingStatusDto, StartRecordingRequest, TakeDto, TakeListQuery,
    TakeUpdateRequest,
};
use base::ErrorKind;
use bytes::Bytes;
use catalog::config::{AppConfig, DeviceConfig};
use catalog::{Catalog, SessionManager};
use http::header::{self, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use std::sync::Arc;
use tracing::{info, warn};
use url::form_urlencoded;

pub type Body = Full<Bytes>;
type ResponseResult = Result<Response<Body>, Response<Body>>;

/// Everything a request handler needs: the catalog, the active-recording manager, the
/// workbook mirror, and static configuration (device list, archive/export paths).
pub struct AppState {
    pub catalog: Catalog,
    pub sessions: SessionManager,
    pub workbook: catalog::workbook::Workbook,
    pub app_config: AppConfig,
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Eq, PartialEq)]
enum Path {
    Take(String, i64),
    TakeList,
    TakeUpdate,
    Recording,
    RecordingStart(String, i64),
    RecordingStop(String, i64),
    ExportSelection,
    ExportByDate,
    NotFound,
}

impl Path {
    fn decode(path: &str) -> Path {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [""] => Path::NotFound,
            ["take"] => Path::TakeList,
            ["take", "update"] => Path::TakeUpdate,
            ["take", slate, take_number] => match take_number.parse() {
                Ok(n) => Path::Take((*slate).to_string(), n),
                Err(_) => Path::NotFound,
            },
            ["recording"] => Path::Recording,
            ["recording", slate, take_number, "start"] => match take_number.parse() {
                Ok(n) => Path::RecordingStart((*slate).to_string(), n),
                Err(_) => Path::NotFound,
            },
            ["recording", slate, take_number, "stop"] => match take_number.parse() {
                Ok(n) => Path::RecordingStop((*slate).to_string(), n),
                Err(_) => Path::NotFound,
            },
            ["export_selection"] => Path::ExportSelection,
            ["export_by_date"] => Path::ExportByDate,
            _ => Path::NotFound,
        }
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body).expect("DTOs always serialize");
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(Full::new(Bytes::from(bytes)))
        .expect("hardcoded response head is valid")
}

fn not_found() -> Response<Body> {
    json_response(StatusCode::NOT_FOUND, &ErrorDto { error: "not found".to_string() })
}

fn method_not_allowed() -> Response<Body> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorDto { error: "method not allowed".to_string() },
    )
}

fn bad_request(msg: impl Into<String>) -> Response<Body> {
    json_response(StatusCode::BAD_REQUEST, &ErrorDto { error: msg.into() })
}

fn from_base_error(err: &base::Error) -> Response<Body> {
    let status = match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument | ErrorKind::ConfigError => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ProtocolError | ErrorKind::DecodeError | ErrorKind::BindError => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::CatalogError | ErrorKind::ArchiveError | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_response(status, &ErrorDto { error: err.to_string() })
}

fn parse_take_list_query(query: Option<&str>) -> Result<TakeListQuery, Response<Body>> {
    let mut parsed = TakeListQuery {
        start_date: None,
        end_date: None,
        slate_hint: None,
    };
    let Some(q) = query else { return Ok(parsed) };
    for (key, value) in form_urlencoded::parse(q.as_bytes()) {
        match key.as_ref() {
            "start_date" => {
                parsed.start_date = Some(
                    chrono::NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .map_err(|e| bad_request(format!("bad start_date: {e}")))?,
                );
            }
            "end_date" => {
                parsed.end_date = Some(
                    chrono::NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                        .map_err(|e| bad_request(format!("bad end_date: {e}")))?,
                );
            }
            "slate_hint" => parsed.slate_hint = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(parsed)
}

async fn read_json_body<T: serde::de::DeserializeOwned>(req: Request<Incoming>) -> Result<T, Response<Body>> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| bad_request(format!("reading request body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| bad_request(format!("bad request body: {e}")))
}

async fn handle_take_get(state: &AppState, slate: &str, take_number: i64) -> ResponseResult {
    let take = state
        .catalog
        .retrieve_take(slate, take_number)
        .map_err(|e| from_base_error(&e))?
        .ok_or_else(not_found)?;
    Ok(json_response(StatusCode::OK, &TakeDto::from(take)))
}

async fn handle_take_list(state: &AppState, query: Option<&str>) -> ResponseResult {
    let query = parse_take_list_query(query)?;
    let takes = state
        .catalog
        .retrieve_takes(&query.into())
        .map_err(|e| from_base_error(&e))?;
    let dtos: Vec<TakeDto> = takes.into_iter().map(TakeDto::from).collect();
    Ok(json_response(StatusCode::OK, &dtos))
}

async fn handle_take_update(state: &AppState, req: Request<Incoming>) -> ResponseResult {
    let update: TakeUpdateRequest = read_json_body(req).await?;
    let take = state
        .catalog
        .update_take(&update.into())
        .map_err(|e| from_base_error(&e))?;
    if let Err(e) = state.workbook.upsert_take(&take) {
        warn!(slate = %take.slate, take_number = take.take_number, error = %e, "workbook mirror update failed");
    }
    Ok(json_response(StatusCode::OK, &TakeDto::from(take)))
}

fn handle_recording_status(state: &AppState) -> ResponseResult {
    let status = state.sessions.get_recording_status();
    Ok(json_response(StatusCode::OK, &RecordingStatusDto::from(status)))
}

async fn handle_recording_start(
    state: &AppState,
    slate: String,
    take_number: i64,
    req: Request<Incoming>,
) -> ResponseResult {
    let body: StartRecordingRequest = read_json_body(req).await?;
    let frame_rate = body.frame_rate.unwrap_or(state.app_config.default_frame_rate);
    state
        .sessions
        .start_recording(
            &state.catalog,
            &state.workbook,
            &state.devices,
            slate.clone(),
            take_number,
            frame_rate,
            body.map,
            body.description,
        )
        .map_err(|e| from_base_error(&e))?;
    let take = state
        .catalog
        .retrieve_take(&slate, take_number)
        .map_err(|e| from_base_error(&e))?
        .ok_or_else(not_found)?;
    Ok(json_response(
        StatusCode::OK,
        &RecordingActionResponse { status: "started", result: TakeDto::from(take) },
    ))
}

fn handle_recording_stop(state: &AppState, slate: &str, take_number: i64) -> ResponseResult {
    let status = state.sessions.get_recording_status();
    if status.slate.as_deref() != Some(slate) || status.take_number != Some(take_number) {
        return Err(bad_request(format!(
            "no recording of {slate}/{take_number} is in progress"
        )));
    }
    let result = state
        .sessions
        .stop_recording(&state.catalog, &state.app_config, &state.workbook)
        .map_err(|e| from_base_error(&e))?;
    info!(stages = result.stage_paths.len(), "archived take");
    let take = state
        .catalog
        .retrieve_take(slate, take_number)
        .map_err(|e| from_base_error(&e))?
        .ok_or_else(not_found)?;
    Ok(json_response(
        StatusCode::OK,
        &RecordingActionResponse { status: "stopped", result: TakeDto::from(take) },
    ))
}

async fn handle_export_selection(state: &AppState, req: Request<Incoming>) -> ResponseResult {
    let body: ExportSelectionRequest = read_json_body(req).await?;
    let ids = body.into_take_ids();
    let takes = state
        .catalog
        .retrieve_takes_by_ids(&ids)
        .map_err(|e| from_base_error(&e))?;
    run_export(state, takes).await
}

async fn handle_export_by_date(state: &AppState, req: Request<Incoming>) -> ResponseResult {
    let body: ExportByDateRequest = read_json_body(req).await?;
    let filter = catalog::TakeFilter {
        start_date: Some(body.start_date),
        end_date: Some(body.end_date),
        slate_hint: None,
    };
    let takes = state.catalog.retrieve_takes(&filter).map_err(|e| from_base_error(&e))?;
    run_export(state, takes).await
}

async fn run_export(state: &AppState, takes: Vec<catalog::Take>) -> ResponseResult {
    if takes.is_empty() {
        return Err(bad_request("no takes matched the export request"));
    }
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let archive_root = state.app_config.archive_path.clone();
    let export_root = state.app_config.export_path.clone();
    let result = tokio::task::spawn_blocking(move || {
        catalog::export::export_takes(&archive_root, &export_root, &takes, &timestamp)
    })
    .await
    .map_err(|e| bad_request(format!("export task panicked: {e}")))?
    .map_err(|e| from_base_error(&e))?;

    for (take, reason) in &result.failed {
        warn!(%take, %reason, "take excluded from export");
    }
    Ok(json_response(
        StatusCode::OK,
        &ExportResponseDto {
            export_location: result.zip_path.to_string_lossy().into_owned(),
            successful_exports: result.exported,
            failed_exports: result
                .failed
                .into_iter()
                .map(|(take, reason)| ExportFailureDto { take, reason })
                .collect(),
        },
    ))
}

async fn route(state: &AppState, req: Request<Incoming>) -> ResponseResult {
    let path = Path::decode(req.uri().path());
    let method = req.method().clone();
    let query = req.uri().query().map(str::to_string);

    match (method, path) {
        (Method::GET, Path::Take(slate, take_number)) => handle_take_get(state, &slate, take_number).await,
        (Method::GET, Path::TakeList) => handle_take_list(state, query.as_deref()).await,
        (Method::PUT, Path::TakeUpdate) => handle_take_update(state, req).await,
        (Method::GET, Path::Recording) => handle_recording_status(state),
        (Method::POST, Path::RecordingStart(slate, take_number)) => {
            handle_recording_start(state, slate, take_number, req).await
        }
        (Method::POST, Path::RecordingStop(slate, take_number)) => {
            handle_recording_stop(state, &slate, take_number)
        }
        (Method::POST, Path::ExportSelection) => handle_export_selection(state, req).await,
        (Method::POST, Path::ExportByDate) => handle_export_by_date(state, req).await,
        (_, Path::NotFound) => Err(not_found()),
        _ => Err(method_not_allowed()),
    }
}

pub async fn serve(state: Arc<AppState>, req: Request<Incoming>) -> Result<Response<Body>, std::convert::Infallible> {
    Ok(route(&state, req).await.unwrap_or_else(|e| e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::testutil::TestHarness;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    #[test]
    fn decodes_take_path() {
        assert_eq!(Path::decode("/take/SlateA/3"), Path::Take("SlateA".to_string(), 3));
    }

    #[test]
    fn decodes_recording_start_path() {
        assert_eq!(
            Path::decode("/recording/SlateA/3/start"),
            Path::RecordingStart("SlateA".to_string(), 3)
        );
    }

    #[test]
    fn unparseable_take_number_is_not_found() {
        assert_eq!(Path::decode("/take/SlateA/not-a-number"), Path::NotFound);
    }

    #[test]
    fn decodes_top_level_routes() {
        assert_eq!(Path::decode("/take/"), Path::TakeList);
        assert_eq!(Path::decode("/recording"), Path::Recording);
        assert_eq!(Path::decode("/export_selection"), Path::ExportSelection);
        assert_eq!(Path::decode("/export_by_date"), Path::ExportByDate);
    }

    /// A server bound to an ephemeral localhost port, serving one connection at a time for
    /// the lifetime of the test. Kept alive for as long as the returned `Server` is in scope.
    struct Server {
        base_url: String,
        _handle: tokio::task::JoinHandle<()>,
    }

    impl Server {
        async fn new(state: AppState) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let state = Arc::new(state);
            let handle = tokio::spawn(async move {
                loop {
                    let (stream, _) = match listener.accept().await {
                        Ok(c) => c,
                        Err(_) => return,
                    };
                    let io = TokioIo::new(stream);
                    let state = state.clone();
                    tokio::spawn(async move {
                        let _ = http1::Builder::new()
                            .serve_connection(
                                io,
                                service_fn(move |req| {
                                    let state = state.clone();
                                    async move { serve(state, req).await }
                                }),
                            )
                            .await;
                    });
                }
            });
            Server { base_url, _handle: handle }
        }
    }

    fn test_state(harness: &TestHarness) -> AppState {
        AppState {
            catalog: Catalog::open_in_memory().unwrap(),
            sessions: SessionManager::new(),
            workbook: catalog::workbook::Workbook::new(harness.app.spreadsheet_path.clone()),
            app_config: harness.app.clone(),
            devices: harness.one_freed_device("camera-a"),
        }
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let harness = TestHarness::new();
        let s = Server::new(test_state(&harness)).await;
        let cli = reqwest::Client::new();
        let resp = cli.get(format!("{}/nonexistent", &s.base_url)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn take_list_starts_empty() {
        let harness = TestHarness::new();
        let s = Server::new(test_state(&harness)).await;
        let cli = reqwest::Client::new();
        let resp = cli.get(format!("{}/take/", &s.base_url)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let takes: Vec<TakeDto> = resp.json().await.unwrap();
        assert!(takes.is_empty());
    }

    #[tokio::test]
    async fn recording_start_then_stop_archives_a_take() {
        let harness = TestHarness::new();
        let s = Server::new(test_state(&harness)).await;
        let cli = reqwest::Client::new();

        let resp = cli
            .post(format!("{}/recording/SlateA/1/start", &s.base_url))
            .json(&serde_json::json!({"map": "camera-a", "frame_rate": 24}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let started: RecordingActionResponse = resp.json().await.unwrap();
        assert_eq!(started.status, "started");
        assert_eq!(started.result.slate, "SlateA");

        let resp = cli
            .post(format!("{}/recording/SlateA/1/stop", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let stopped: RecordingActionResponse = resp.json().await.unwrap();
        assert_eq!(stopped.status, "stopped");
        assert_eq!(stopped.result.slate, "SlateA");
        assert_eq!(stopped.result.take_number, 1);
    }

    #[tokio::test]
    async fn recording_stop_without_start_is_bad_request() {
        let harness = TestHarness::new();
        let s = Server::new(test_state(&harness)).await;
        let cli = reqwest::Client::new();
        let resp = cli
            .post(format!("{}/recording/SlateA/1/stop", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
