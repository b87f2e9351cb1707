// Startup Insights - Web Server
// JSON API over the store: records, the six report tables, collection stats

use axum::{
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use startup_insights::{
    logging, CollectionStats, Filter, Query, StartupRecord, StartupStore, StoreConfig, StoreError,
    Table, DEFAULT_LIMIT,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<StartupStore>>,
    collection: String,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn store_failure(err: StoreError) -> Response {
    let status = match &err {
        StoreError::Validation(_) | StoreError::InvalidCollection(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::DuplicateKey { .. } => StatusCode::CONFLICT,
        _ => {
            error!("store error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    failure(status, err.to_string())
}

/// Query string for /api/startups
#[derive(Debug, Default, Deserialize)]
struct StartupParams {
    country: Option<String>,
    industry: Option<String>,
    status: Option<String>,
    from: Option<i32>,
    to: Option<i32>,
}

impl From<StartupParams> for Filter {
    fn from(params: StartupParams) -> Self {
        let mut filter = Filter::all().founded_between(params.from, params.to);
        filter.country = params.country;
        filter.industry = params.industry;
        filter.status = params.status;
        filter
    }
}

#[derive(Debug, Deserialize)]
struct ReportParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ReportEntry {
    name: &'static str,
    title: &'static str,
    takes_limit: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> Response {
    let store = state.store.lock().unwrap();
    match store.ping() {
        Ok(()) => ApiResponse::ok("OK"),
        Err(e) => store_failure(e),
    }
}

/// GET /api/startups - Records matching the query-string filters
async fn list_startups(State(state): State<AppState>, QueryParams(params): QueryParams<StartupParams>) -> Response {
    let store = state.store.lock().unwrap();
    let result = store.collection(&state.collection).and_then(|coll| {
        coll.find(&Filter::from(params))?
            .collect::<startup_insights::Result<Vec<StartupRecord>>>()
    });

    match result {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => store_failure(e),
    }
}

/// GET /api/startups/:name - One record; the path segment arrives percent-decoded
async fn get_startup(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let store = state.store.lock().unwrap();
    match store.collection(&state.collection).and_then(|coll| coll.find_one(&name)) {
        Ok(Some(record)) => ApiResponse::ok(record),
        Ok(None) => store_failure(StoreError::NotFound { name }),
        Err(e) => store_failure(e),
    }
}

/// GET /api/reports - Available queries
async fn list_reports() -> Response {
    let entries: Vec<ReportEntry> = Query::ALL
        .iter()
        .map(|q| ReportEntry {
            name: q.name(),
            title: q.title(),
            takes_limit: q.takes_limit(),
        })
        .collect();
    ApiResponse::ok(entries)
}

/// GET /api/reports/:query - One report table
async fn get_report(
    State(state): State<AppState>,
    Path(query): Path<String>,
    QueryParams(params): QueryParams<ReportParams>,
) -> Response {
    let query: Query = match query.parse() {
        Ok(q) => q,
        Err(message) => return failure(StatusCode::NOT_FOUND, message),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let store = state.store.lock().unwrap();
    let result: startup_insights::Result<Table> = store
        .collection(&state.collection)
        .and_then(|coll| query.run(&coll, limit));

    match result {
        Ok(table) => ApiResponse::ok(table),
        Err(e) => store_failure(e),
    }
}

/// GET /api/stats - Collection statistics
async fn get_stats(State(state): State<AppState>) -> Response {
    let store = state.store.lock().unwrap();
    let result: startup_insights::Result<CollectionStats> =
        store.collection(&state.collection).and_then(|coll| coll.stats());

    match result {
        Ok(stats) => ApiResponse::ok(stats),
        Err(e) => store_failure(e),
    }
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/startups", get(list_startups))
        .route("/startups/:name", get(get_startup))
        .route("/reports", get(list_reports))
        .route("/reports/:query", get(get_report))
        .route("/stats", get(get_stats))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let config = StoreConfig::from_env();
    let store = StartupStore::connect(&config)?;
    store.collection(&config.collection_name)?;
    info!(collection = %config.collection_name, "store ready");

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        collection: config.collection_name.clone(),
    };

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/reports", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use startup_insights::sample_startups;
    use tower::ServiceExt;

    fn state() -> AppState {
        let store = StartupStore::open_in_memory().unwrap();
        store.collection("startups").unwrap().insert_many(&sample_startups()).unwrap();
        AppState {
            store: Arc::new(Mutex::new(store)),
            collection: "startups".to_string(),
        }
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        get_json_from(state(), uri).await
    }

    async fn get_json_from(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_filtered_startups() {
        let (status, body) = get_json("/api/startups?industry=Banking").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Revolut", "Nubank"]);
    }

    #[tokio::test]
    async fn test_single_startup() {
        let (status, body) = get_json("/api/startups/Grab").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["country"], "Singapore");

        let (status, body) = get_json("/api/startups/Nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_startup_name_decoded_once() {
        let state = state();
        {
            let store = state.store.lock().unwrap();
            let mut doc = sample_startups()[0].clone();
            doc["name"] = serde_json::json!("A%41");
            store.collection("startups").unwrap().insert_one(&doc).unwrap();
        }

        let (status, body) = get_json_from(state.clone(), "/api/startups/A%2541").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "A%41");

        let (status, _) = get_json_from(state, "/api/startups/Open%20Nothing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_table() {
        let (status, body) = get_json("/api/reports/top-funded?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"]["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "Grab");
        assert_eq!(rows[1][0], "Stripe");

        let (status, _) = get_json("/api/reports/nonsense").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats() {
        let (status, body) = get_json("/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_documents"], 5);
        assert_eq!(body["data"]["indexes"].as_array().unwrap().len(), 4);
    }
}
