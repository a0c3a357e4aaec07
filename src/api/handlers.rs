use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use super::{HealthResponse, SaveResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::store::RunRecord;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Fields a save payload must carry. Presence-only: values are coerced
/// later during the store write, not validated here.
const REQUIRED_SAVE_FIELDS: [&str; 6] = [
    "generation",
    "population",
    "settings",
    "bestFitness",
    "topic",
    "bestMnemonic",
];

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.tts.is_loaded(),
    })
}

pub async fn save(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<SaveResponse>, AppError> {
    for field in REQUIRED_SAVE_FIELDS {
        if body.get(field).is_none() {
            return Err(AppError::MissingField(field.to_string()));
        }
    }

    let record = RunRecord::from_json(&body)?;
    let row = state.store.append_record(&record)?;

    tracing::info!("Data saved to row {}", row);

    Ok(Json(SaveResponse {
        success: true,
        message: "Data saved successfully".to_string(),
        row,
    }))
}

pub async fn download(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let bytes = state.store.fetch_file_bytes()?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XLSX_MIME),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=evolution_data.xlsx",
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn tts(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let text = match body.get("text").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => text,
        _ => return Err(AppError::BadRequest("Text is required".to_string())),
    };
    let language = body.get("language").and_then(Value::as_str).unwrap_or("en");

    let preview: String = text.chars().take(50).collect();
    tracing::info!("Generating speech: {}...", preview);

    let wav = state.tts.synthesize(text, language)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "inline"),
        ],
        wav,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::store::SpreadsheetStore;
    use crate::tts::TtsService;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app() -> (TempDir, axum::Router) {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState {
            tts: TtsService::unloaded(),
            store: SpreadsheetStore::new(dir.path()),
        });
        (dir, create_router(state))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn valid_save_payload() -> Value {
        json!({
            "generation": 4,
            "population": [],
            "settings": {},
            "bestFitness": 0.87,
            "avgFitness": 0.55,
            "topic": "Krebs cycle",
            "bestMnemonic": "Citrate is Krebs' starting substrate",
            "targetTerms": "citrate, isocitrate",
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let (_dir, app) = test_app();

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_save_missing_field_is_400_and_leaves_no_file() {
        let (dir, app) = test_app();

        let mut payload = valid_save_payload();
        payload.as_object_mut().unwrap().remove("topic");

        let response = app.oneshot(post_json("/save", payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("topic"));
        assert!(!dir.path().join("evolution_data.xlsx").exists());
    }

    #[tokio::test]
    async fn test_save_appends_rows_in_order() {
        let (_dir, app) = test_app();

        let response = app
            .clone()
            .oneshot(post_json("/save", valid_save_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["row"], 2);

        let response = app
            .oneshot(post_json("/save", valid_save_payload()))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["row"], 3);
    }

    #[tokio::test]
    async fn test_download_without_file_is_404() {
        let (_dir, app) = test_app();

        let response = app.oneshot(get("/download")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_round_trips_saved_record() {
        let (dir, app) = test_app();

        let response = app
            .clone()
            .oneshot(post_json("/save", valid_save_payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/download")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=evolution_data.xlsx"
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_MIME);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let download_path = dir.path().join("downloaded.xlsx");
        std::fs::write(&download_path, &bytes).unwrap();

        let book = umya_spreadsheet::reader::xlsx::read(&download_path).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_highest_row(), 2);
        assert_eq!(sheet.get_value((2, 2)), "4");
        assert_eq!(sheet.get_value((3, 2)), "0.87");
        assert_eq!(sheet.get_value((11, 2)), "Krebs cycle");
        assert_eq!(
            sheet.get_value((12, 2)),
            "Citrate is Krebs' starting substrate"
        );
    }

    #[tokio::test]
    async fn test_tts_missing_text_is_400() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(post_json("/tts", json!({ "language": "en" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tts_empty_text_is_400() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(post_json("/tts", json!({ "text": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tts_unloaded_model_is_503() {
        let (_dir, app) = test_app();

        let response = app
            .oneshot(post_json("/tts", json!({ "text": "hello there" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["code"], "MODEL_NOT_LOADED");
    }
}
