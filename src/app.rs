use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::error::LedgerError;
use crate::record::HearingRecord;
use crate::store::LedgerStore;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct AppState {
    store: LedgerStore,
    base_url: String,
}

impl AppState {
    pub fn new(store: LedgerStore, base_url: impl Into<String>) -> Self {
        AppState {
            store,
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct CreateQuery {
    nombre: String,
}

/// Body of `POST /audiencias/`: the record fields plus the target ledger.
#[derive(Deserialize)]
struct AppendRequest {
    #[serde(alias = "file_name")]
    nombre_archivo: String,
    #[serde(flatten)]
    record: HearingRecord,
}

/// Error body sent to clients: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            log::error!("{}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/crear_archivo/", post(create_ledger))
        .route("/audiencias/", post(append_record))
        .route("/audiencias/:nombre", get(list_records))
        .route("/archivos/", get(list_ledgers))
        .route("/exportar/:nombre", post(export_ledger))
        .route("/descargar/:nombre", get(download))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(config.store(), config.base_url()));
    let app = router(state);

    let listener = TcpListener::bind(config.bind).await?;
    log::info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn create_ledger(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CreateQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = state.store.create_from_template(&query.nombre)?;
    Ok(Json(json!({ "ruta": path.display().to_string() })))
}

async fn append_record(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AppendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state
        .store
        .append_one(&payload.nombre_archivo, payload.record)?;
    Ok(Json(json!({
        "ok": true,
        "audiencias_guardadas": summary.records,
    })))
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Path(nombre): Path<String>,
) -> Result<Json<Vec<HearingRecord>>, ApiError> {
    Ok(Json(state.store.read_all(&nombre)?))
}

async fn list_ledgers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list()?))
}

async fn export_ledger(
    State(state): State<Arc<AppState>>,
    Path(nombre): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let exported = state.store.export(&nombre)?;
    let download_url = format!(
        "{}/descargar/{}",
        state.base_url,
        urlencoding::encode(&exported)
    );
    Ok(Json(json!({
        "download_url": download_url,
        "archivo_exportado": exported,
    })))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(nombre): Path<String>,
) -> Result<Response, ApiError> {
    let path = state.store.download_path(&nombre).map_err(|e| match e {
        LedgerError::NotFound(_) => ApiError {
            status: StatusCode::NOT_FOUND,
            detail: format!("Archivo no encontrado: {}", nombre),
        },
        other => other.into(),
    })?;

    let bytes = std::fs::read(&path).map_err(LedgerError::from)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(nombre);
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&file_name)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::write_default_template;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    fn app() -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let template = dir.path().join("Plantillas").join("plantilla_base");
        write_default_template(&template).unwrap();
        let store = LedgerStore::new(dir.path().join("archivos"), template);
        let state = Arc::new(AppState::new(store, "http://127.0.0.1:8000"));
        (dir, router(state))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post(uri: &str) -> Request<Body> {
        Request::post(uri).body(Body::empty()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn hearing(case_id: &str) -> serde_json::Value {
        json!({
            "nombre_archivo": "test.xlsx",
            "radicado": case_id,
            "tipo_audiencia": "Audiencia de conciliación",
            "fecha": "25/07/2024",
            "hora": "10:00",
            "juzgado": "Juzgado 1",
            "se_realizo": "si",
            "motivos": ["Acuerdo"],
            "observaciones": "ok"
        })
    }

    #[tokio::test]
    async fn create_append_and_list() {
        let (_dir, app) = app();

        let (status, body) = send_json(&app, post("/crear_archivo/?nombre=test")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["ruta"].as_str().unwrap().ends_with("test.xlsx"));

        let (status, body) = send_json(&app, post_json("/audiencias/", hearing("12345-ABC"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "audiencias_guardadas": 1 }));

        let (status, body) = send_json(&app, get("/archivos/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["test.xlsx"]));

        let (status, body) = send_json(&app, get("/audiencias/test")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["radicado"], "12345-ABC");
        assert_eq!(body[0]["se_realizo"], "SI");
    }

    #[tokio::test]
    async fn client_errors_are_400_with_detail() {
        let (_dir, app) = app();
        send(&app, post("/crear_archivo/?nombre=test")).await;

        let (status, body) = send_json(&app, post("/crear_archivo/?nombre=test")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            "Ya existe un archivo con el nombre 'test.xlsx'. Elija otro nombre."
        );

        let mut bad = hearing("1");
        bad["tipo_audiencia"] = json!("Conciliación");
        let (status, body) = send_json(&app, post_json("/audiencias/", bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("no es válido"));

        let mut missing = hearing("1");
        missing["nombre_archivo"] = json!("otro");
        let (status, body) = send_json(&app, post_json("/audiencias/", missing)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "El archivo 'otro.xlsx' no existe.");
    }

    #[tokio::test]
    async fn export_then_download() {
        let (_dir, app) = app();
        send(&app, post("/crear_archivo/?nombre=test")).await;
        send(&app, post_json("/audiencias/", hearing("1"))).await;

        let (status, body) = send_json(&app, post("/exportar/test.xlsx")).await;
        assert_eq!(status, StatusCode::OK);
        let exported = body["archivo_exportado"].as_str().unwrap().to_string();
        assert!(exported.starts_with("test_exportado_"));
        assert_eq!(
            body["download_url"],
            format!("http://127.0.0.1:8000/descargar/{}", exported)
        );

        let response = app
            .clone()
            .oneshot(get(&format!("/descargar/{}", exported)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_MIME);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn download_of_a_missing_file_is_404() {
        let (_dir, app) = app();

        let (status, body) = send_json(&app, get("/descargar/nada.xlsx")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Archivo no encontrado: nada.xlsx");
    }
}
