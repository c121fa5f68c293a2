use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::rag::{Answer, RagEngine, RagError};

const MAX_CONCURRENT_REQUESTS: usize = 32;

pub const EMPTY_QUESTION: &str = "Please enter a question";
pub const NO_DOCUMENTS: &str =
    "No documents found in the index. Please ingest papers first.";

#[derive(Clone)]
pub struct AppState {
    engine: RagEngine,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 2000))]
    query: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    response: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    documents: u64,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Create and configure the API router
pub fn create_api(engine: RagEngine) -> Router {
    let state = AppState { engine };

    // Fully permissive CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/", get(home_handler))
        .route("/query", post(query_handler))
        .route("/ask", post(ask_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .with_state(state)
}

pub async fn serve(engine: RagEngine, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, create_api(engine)).await?;
    Ok(())
}

async fn document_count(state: &AppState) -> u64 {
    match state.engine.document_count().await {
        Ok(n) => n,
        Err(e) => {
            warn!("Could not count indexed documents: {}", e);
            0
        }
    }
}

fn render_home(has_documents: bool) -> String {
    let status = if has_documents {
        "Documents are indexed. Ask away."
    } else {
        "No documents indexed yet. Ingest some papers first."
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Research Paper Copilot</title></head>
<body>
<h1>Research Paper Copilot</h1>
<p id="status">{}</p>
<form method="post" action="/ask">
  <input type="text" name="question" size="80" placeholder="Ask a question about the papers">
  <button type="submit">Ask</button>
</form>
</body>
</html>
"#,
        status
    )
}

async fn home_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_home(document_count(&state).await > 0))
}

async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.engine.generate_response(&request.query).await {
        Ok(answer) => Json::<Answer>(answer).into_response(),
        Err(RagError::EmptyQuery) => error_response(StatusCode::BAD_REQUEST, EMPTY_QUESTION),
        Err(e) => {
            error!("Query failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn ask_handler(
    State(state): State<AppState>,
    payload: Result<Form<AskRequest>, FormRejection>,
) -> Response {
    let request = match payload {
        Ok(Form(request)) => request,
        Err(rejection) => return error_response(rejection.status(), rejection.body_text()),
    };
    let question = request.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, EMPTY_QUESTION);
    }

    if document_count(&state).await == 0 {
        return error_response(StatusCode::CONFLICT, NO_DOCUMENTS);
    }

    match state.engine.generate_response(question).await {
        Ok(answer) => Json(AskResponse {
            response: answer.response,
        })
        .into_response(),
        Err(e) => {
            error!("Ask failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        documents: document_count(&state).await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::engine::tests::{chunk, RecordingProvider, StaticRetriever};
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(chunks: Vec<crate::rag::RetrievedChunk>) -> Router {
        let engine = RagEngine::new(
            Arc::new(StaticRetriever { chunks, fail: false }),
            Arc::new(RecordingProvider::default()),
            3,
        );
        create_api(engine)
    }

    fn indexed_app() -> Router {
        app(vec![
            chunk("1301.3781", true, 0.91, "Skip-gram predicts context words."),
            chunk("1301.3781", true, 0.80, "CBOW predicts the center word."),
        ])
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn form(question: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ask")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("question={}", urlencoding::encode(question))))
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_returns_answer_and_papers() {
        let request = Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"query":"what is skip-gram?"}"#))
            .unwrap();

        let response = indexed_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["response"], "Word2vec learns embeddings.");
        let papers = body["papers"].as_array().unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0]["similarity"], "0.91");
        assert_eq!(papers[0]["url"], "https://arxiv.org/abs/1301.3781");
    }

    #[tokio::test]
    async fn test_query_validation() {
        let request = Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"query":""}"#))
            .unwrap();

        let response = indexed_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_query_bodies_get_json_errors() {
        let missing_field = Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"question":"wrong field"}"#))
            .unwrap();
        let response = indexed_app().oneshot(missing_field).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["error"].is_string());

        let not_json = Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("what is skip-gram?"))
            .unwrap();
        let response = indexed_app().oneshot(not_json).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body_json(response).await["error"].is_string());

        let broken = Request::builder()
            .method("POST")
            .uri("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"query":"#))
            .unwrap();
        let response = indexed_app().oneshot(broken).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let response = indexed_app().oneshot(form("   ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], EMPTY_QUESTION);
    }

    #[tokio::test]
    async fn test_ask_requires_documents() {
        let response = app(vec![]).oneshot(form("anything?")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], NO_DOCUMENTS);
    }

    #[tokio::test]
    async fn test_ask_answers() {
        let response = indexed_app().oneshot(form("what is CBOW?")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["response"], "Word2vec learns embeddings.");
    }

    #[tokio::test]
    async fn test_health_and_home() {
        let response = indexed_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["documents"], 2);

        let response = app(vec![])
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("No documents indexed yet"));
    }
}
