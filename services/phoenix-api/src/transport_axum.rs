use std::future::Future;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::transport::{
    self, ApiConfig, CORS_HEADERS, HttpResponse, PhoenixRuntime, QueryParams, SharedRuntime,
};

#[derive(Clone)]
struct AppState {
    runtime: SharedRuntime,
}

/// Builds the tokio runtime, binds `config.bind_addr` and serves until ctrl-c.
pub fn serve_http_with_axum(runtime: PhoenixRuntime, config: &ApiConfig) -> Result<(), String> {
    let worker_threads = config.http_workers.max(1);
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let bind_addr = config.bind_addr.clone();
    let max_body_bytes = config.max_body_bytes;
    tokio_runtime.block_on(async move {
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
        serve_on_listener(
            listener,
            runtime.into_shared(),
            max_body_bytes,
            shutdown_signal(),
        )
        .await
    })
}

pub async fn serve_on_listener<F>(
    listener: TcpListener,
    runtime: SharedRuntime,
    max_body_bytes: usize,
    shutdown: F,
) -> Result<(), String>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(runtime, max_body_bytes))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| format!("axum server failed: {e}"))
}

pub fn router(runtime: SharedRuntime, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/status", get(status).fallback(method_not_allowed))
        .route(
            "/api/phoenix-data",
            get(get_document)
                .post(save_document)
                .delete(clear_document)
                .fallback(method_not_allowed),
        )
        .route("/api/outlet", any(missing_outlet_code))
        .route("/api/outlet/", any(missing_outlet_code))
        .route(
            "/api/outlet/:code",
            get(get_outlet)
                .post(put_outlet)
                .put(put_outlet)
                .delete(delete_outlet)
                .fallback(method_not_allowed),
        )
        .route("/api/backups", get(list_backups).fallback(method_not_allowed))
        .route("/api/backups/:id", get(get_backup).fallback(method_not_allowed))
        .route(
            "/api/backups/:id/restore",
            post(restore_backup).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(AppState { runtime })
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(cors))
}

async fn status() -> HttpResponse {
    transport::status()
}

async fn get_document(State(state): State<AppState>) -> HttpResponse {
    transport::get_document(&state.runtime)
}

async fn save_document(State(state): State<AppState>, body: Bytes) -> HttpResponse {
    transport::save_document(&state.runtime, &body)
}

async fn clear_document(
    State(state): State<AppState>,
    Query(query): Query<QueryParams>,
) -> HttpResponse {
    transport::clear_document(&state.runtime, &query)
}

async fn get_outlet(State(state): State<AppState>, Path(code): Path<String>) -> HttpResponse {
    transport::get_outlet(&state.runtime, Some(&code))
}

async fn put_outlet(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Bytes,
) -> HttpResponse {
    transport::put_outlet(&state.runtime, Some(&code), &body)
}

async fn delete_outlet(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<QueryParams>,
) -> HttpResponse {
    transport::delete_outlet(&state.runtime, Some(&code), &query)
}

async fn missing_outlet_code(State(state): State<AppState>) -> HttpResponse {
    transport::get_outlet(&state.runtime, None)
}

async fn list_backups(
    State(state): State<AppState>,
    Query(query): Query<QueryParams>,
) -> HttpResponse {
    transport::list_backups(&state.runtime, &query)
}

async fn get_backup(State(state): State<AppState>, Path(id): Path<String>) -> HttpResponse {
    transport::get_backup(&state.runtime, &id)
}

async fn restore_backup(State(state): State<AppState>, Path(id): Path<String>) -> HttpResponse {
    transport::restore_backup(&state.runtime, &id)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::method_not_allowed()
}

async fn not_found() -> HttpResponse {
    HttpResponse::not_found()
}

/// Answers preflights directly and stamps CORS headers on everything else.
async fn cors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let mut response = if method == Method::OPTIONS {
        HttpResponse::no_content().into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    debug!(%method, path = %path, status = response.status().as_u16(), "request served");
    response
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install ctrl-c handler; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        let mut out = Response::new(Body::from(self.body));
        *out.status_mut() = status;
        out.headers_mut().insert(
            CONTENT_TYPE,
            self.content_type
                .parse()
                .unwrap_or(HeaderValue::from_static("application/json")),
        );
        out
    }
}
