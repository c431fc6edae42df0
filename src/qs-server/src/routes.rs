//! Handlers for the three operations-surface routes. Each handler's job
//! is parse-validate-delegate; no business logic lives here.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use qs_catalog::SetCatalog as _;
use qs_ledger::LedgerStore as _;
use qs_proto::{
    AllocateRequest, AllocateResponse, GenerateSetsRequest, GenerateSetsResponse, MergeCategoryItems, MergeRequest,
    MergeResponse, ValidationError,
};
use qs_types::UserId;
use serde::Deserialize;

use crate::AppState;

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct GenerateSetsBody {
    #[serde(rename = "numSetsPerCategory")]
    num_sets_per_category: i64,
    #[serde(rename = "itemsPerSet")]
    items_per_set: i64,
}

pub async fn generate_sets(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateSetsBody>,
) -> Result<Json<GenerateSetsResponse>, ValidationError> {
    let params = GenerateSetsRequest::new(body.num_sets_per_category, body.items_per_set)?;

    let builder = Arc::clone(&state.builder);
    let categories: Vec<_> = state.known_categories.iter().cloned().collect();
    let num_sets = params.num_sets_per_category() as usize;
    let items_per_set = params.items_per_set() as usize;
    tokio::spawn(async move {
        let report = builder.build(&categories, num_sets, items_per_set).await;
        tracing::info!(produced = report.total_produced(), "generate-sets run completed");
    });

    Ok(Json(GenerateSetsResponse {
        accepted: true,
        params,
    }))
}

#[derive(Deserialize)]
pub struct AllocateBody {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "categoryIds")]
    category_ids: Vec<String>,
    #[serde(rename = "requestId", default)]
    request_id: Option<String>,
}

pub async fn allocate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AllocateBody>,
) -> Result<Json<AllocateResponse>, ValidationError> {
    let request = AllocateRequest::new(
        UserId(body.user_id),
        body.category_ids.into_iter().map(qs_types::CategoryId).collect(),
        body.request_id,
        &state.known_categories,
    )?;

    let outcome = state.allocator.allocate_batch(request.user_id(), request.category_ids()).await;
    Ok(Json(AllocateResponse::from(outcome)))
}

#[derive(Deserialize)]
pub struct MergeBody {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "categoryIds")]
    category_ids: Vec<String>,
}

pub async fn merge(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MergeBody>,
) -> Result<Json<MergeResponse>, ValidationError> {
    let request = MergeRequest::new(
        UserId(body.user_id),
        body.category_ids.into_iter().map(qs_types::CategoryId).collect(),
    )?;

    // Merge reads the user's *current* allocation per category — the
    // most recently assigned set-id, i.e. the last entry in the ledger's
    // ordered list — and materializes it. It never draws a new one; that
    // is the allocator's job, not merge's.
    let mut categories = BTreeMap::new();
    let mut all_items = Vec::new();
    for category in request.category_ids() {
        let Ok(entries) = state.ledger.read(request.user_id(), category).await else {
            continue;
        };
        let Some(latest) = entries.last() else {
            continue;
        };
        let Ok(Some(set)) = state.catalog.get(&latest.set_id).await else {
            continue;
        };
        let items = state.materializer.materialize(&set).await;
        all_items.extend(items.iter().cloned());
        categories.insert(
            category.clone(),
            MergeCategoryItems {
                set_id: latest.set_id.clone(),
                item_count: items.len(),
                items,
            },
        );
    }

    Ok(Json(MergeResponse { categories, all_items }))
}
