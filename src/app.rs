//! EAR service API

use crate::app_state::{AppState, SharedAppState};
use crate::cli::CommandLineArgs;
use crate::error::EarError;
use crate::metrics::{metrics_handler, record_response_metrics, request_counter};
use crate::models::{DataCreate, DataItem, Message, Page, QueryParams, WarehouseQuery};
use crate::validated::{ValidatedJson, ValidatedQuery};
use crate::warehouse::{self, Warehouse};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

/// Returns a [axum::Router] for the EAR API with the given state.
pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ear/data", get(ear_data))
        .route("/data", get(get_data).post(post_data))
        .route("/metrics", get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .on_request(request_counter)
                .on_response(record_response_metrics),
        )
        .with_state(state)
}

/// The complete service: the router behind trailing slash normalisation.
pub type Service = NormalizePath<Router>;

/// Returns a [crate::app::Service] built from the command line arguments.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn service(args: &CommandLineArgs) -> Result<Service, reqwest::Error> {
    let state = Arc::new(AppState::new(args)?);
    Ok(with_normalized_path(router(state)))
}

/// Trim trailing slashes before routing, so `/data/` reaches `/data`.
pub fn with_normalized_path(router: Router) -> Service {
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

async fn root() -> Json<Message> {
    Json(Message::new("API running"))
}

/// Query handler for EAR data
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `params`: Validated query string
#[tracing::instrument(level = "DEBUG", skip(state))]
async fn ear_data(
    State(state): State<SharedAppState>,
    ValidatedQuery(params): ValidatedQuery<QueryParams>,
) -> Result<Json<Page>, EarError> {
    state.engine.query(&params).await.map(Json)
}

fn configured_warehouse(state: &AppState) -> Result<&dyn Warehouse, EarError> {
    state
        .warehouse
        .as_deref()
        .ok_or(EarError::WarehouseNotConfigured)
}

#[tracing::instrument(level = "DEBUG", skip(state))]
async fn get_data(
    State(state): State<SharedAppState>,
    ValidatedQuery(query): ValidatedQuery<WarehouseQuery>,
) -> Result<Json<Vec<DataItem>>, EarError> {
    let warehouse = configured_warehouse(&state)?;
    warehouse::list_items(warehouse, query.limit).await.map(Json)
}

#[tracing::instrument(level = "DEBUG", skip(state))]
async fn post_data(
    State(state): State<SharedAppState>,
    ValidatedJson(item): ValidatedJson<DataCreate>,
) -> Result<(StatusCode, Json<Message>), EarError> {
    let warehouse = configured_warehouse(&state)?;
    warehouse::create_item(warehouse, &item).await?;
    Ok((
        StatusCode::CREATED,
        Json(Message::new("data inserted successfully")),
    ))
}
