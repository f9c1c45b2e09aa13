use crate::config::Config;
use crate::dispatch::CampaignDispatcher;
use crate::errors::AppError;
use crate::limits::{GatedFeature, LimitEvaluator};
use crate::models::*;
use crate::pipeline::LeadPipeline;
use crate::store::{CampaignStore, CompanyStore, LeadStore};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use moka::future::Cache;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Dispatch deduplication cache: campaigns currently inside a send loop.
    /// Prevents two concurrent requests from double-sending a campaign.
    pub dispatching_campaigns: Cache<Uuid, i64>,
    /// Per-company plan rows (checksummed JSON) so gating checks do not
    /// re-read the plans table on every request.
    pub plan_cache: Cache<Uuid, String>,
}

impl AppState {
    fn evaluator(&self) -> LimitEvaluator {
        LimitEvaluator::new(self.db.clone(), self.plan_cache.clone())
    }
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-bizops-api",
            "version": "0.1.0"
        })),
    )
}

/// Resolves the calling tenant from the request headers.
///
/// Identity is explicit context: every handler calls this once and threads
/// the returned company id through, so no operation ever reads tenant state
/// ambiently. Also validates the shared bearer token when one is configured.
async fn resolve_company(state: &AppState, headers: &HeaderMap) -> Result<Uuid, AppError> {
    validate_api_token(state, headers)?;

    let raw = headers
        .get("X-Company-Id")
        .or_else(|| headers.get("x-company-id"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing X-Company-Id header".to_string()))?;

    let company_id = Uuid::parse_str(raw)
        .map_err(|_| AppError::BadRequest("X-Company-Id must be a UUID".to_string()))?;

    let company = CompanyStore::new(state.db.clone())
        .find(company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Company {} not found", company_id)))?;

    Ok(company.id)
}

/// Validate the Authorization bearer token when API_TOKEN is configured.
fn validate_api_token(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    // If no token is configured, skip validation (warned at startup)
    let Some(ref expected) = state.config.api_token else {
        return Ok(());
    };

    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(token, expected) {
        tracing::warn!("Invalid API token received");
        return Err(AppError::Unauthorized("Invalid API token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison (basic implementation)
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// GET /api/v1/limits/{feature}
///
/// Checks whether the company may create one more unit of a gated feature.
#[utoipa::path(
    get,
    path = "/api/v1/limits/{feature}",
    params(("feature" = String, Path, description = "Gated feature name (products, invoices, quotes, leads, campaigns, ai_queries)")),
    responses(
        (status = 200, description = "Limit check result", body = LimitCheckResponse),
        (status = 400, description = "Unknown feature name"),
        (status = 402, description = "Company has no active plan")
    )
)]
pub async fn check_limit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(feature): Path<String>,
) -> Result<Json<LimitCheckResponse>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;
    let feature = GatedFeature::parse(&feature)?;

    let check = state.evaluator().check(company_id, feature).await?;
    Ok(Json(check))
}

/// GET /api/v1/usage
///
/// Current usage across every gated feature, for the account dashboard.
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    responses(
        (status = 200, description = "Usage summary", body = UsageResponse),
        (status = 402, description = "Company has no active plan")
    )
)]
pub async fn usage_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsageResponse>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;

    let summary = state.evaluator().usage_summary(company_id).await?;
    Ok(Json(summary))
}

/// POST /api/v1/campaigns
///
/// Creates a draft campaign. Creation is gated on the `campaigns` feature;
/// the check and the insert are not transactionally linked, so two
/// concurrent creations can briefly exceed the limit by one. Accepted.
#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 200, description = "Created campaign", body = Campaign),
        (status = 400, description = "Missing required fields"),
        (status = 402, description = "Campaign limit reached or no plan")
    )
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;

    if payload.name.trim().is_empty()
        || payload.subject.trim().is_empty()
        || payload.body_html.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "name, subject and body_html are required".to_string(),
        ));
    }

    state
        .evaluator()
        .require_capacity(company_id, GatedFeature::Campaigns)
        .await?;

    let campaign = CampaignStore::new(state.db.clone())
        .create(company_id, &payload)
        .await?;

    tracing::info!("Created campaign {} for company {}", campaign.id, company_id);
    Ok(Json(campaign))
}

/// GET /api/v1/campaigns/{id}
///
/// Campaign status and aggregate counters.
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "The campaign", body = Campaign),
        (status = 404, description = "Campaign not found")
    )
)]
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;

    let campaign = CampaignStore::new(state.db.clone())
        .get(company_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", id)))?;

    Ok(Json(campaign))
}

/// POST /api/v1/campaigns/{id}/dispatch
///
/// Runs the send loop for a campaign. The response always reports
/// `{total, sent, failed}` - partial failure is a normal outcome, not an
/// error. Concurrent dispatch of the same campaign is deduplicated.
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/dispatch",
    request_body = DispatchRequest,
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Aggregate send outcome", body = DispatchResponse),
        (status = 404, description = "Campaign not found"),
        (status = 422, description = "No recipients with a valid email address")
    )
)]
pub async fn dispatch_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<DispatchRequest>>,
) -> Result<Json<DispatchResponse>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;
    let subset = payload.and_then(|Json(p)| p.recipient_ids);

    // Dispatch dedup: mark the campaign as in-flight, then double-check
    // after a short propagation delay in case two requests raced the mark.
    // In-memory cache, so this covers a single instance; a multi-instance
    // deployment would need a shared lock (e.g. Redis SET NX).
    let now = chrono::Utc::now().timestamp_millis();

    if let Some(since) = state.dispatching_campaigns.get(&id).await {
        tracing::warn!(
            "Duplicate dispatch blocked - campaign {} already dispatching (started {}ms ago)",
            id,
            now - since
        );
        return Err(AppError::BadRequest(
            "Campaign is already being dispatched".to_string(),
        ));
    }

    state.dispatching_campaigns.insert(id, now).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some(marked) = state.dispatching_campaigns.get(&id).await {
        if marked != now {
            tracing::warn!("Lost dispatch race for campaign {}, backing off", id);
            return Err(AppError::BadRequest(
                "Campaign is already being dispatched".to_string(),
            ));
        }
    }

    let dispatcher = CampaignDispatcher::new(&state.config, state.db.clone());
    let result = dispatcher
        .dispatch(company_id, id, subset.as_deref())
        .await;

    // Release the in-flight mark whether the loop succeeded or aborted
    state.dispatching_campaigns.invalidate(&id).await;

    result.map(Json)
}

/// GET /api/v1/leads
///
/// All leads owned by the company, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/leads",
    responses(
        (status = 200, description = "The company's leads", body = [Lead])
    )
)]
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Lead>>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;

    let leads = LeadStore::new(state.db.clone()).list(company_id).await?;
    Ok(Json(leads))
}

/// POST /api/v1/leads/generate
///
/// Runs the lead-generation pipeline: search, AI extraction, persistence.
/// Gated on both `ai_queries` (the query itself) and `leads` (the rows it
/// will create).
#[utoipa::path(
    post,
    path = "/api/v1/leads/generate",
    request_body = GenerateLeadsRequest,
    responses(
        (status = 200, description = "Generated leads", body = GenerateLeadsResponse),
        (status = 400, description = "Empty query"),
        (status = 402, description = "AI query or lead limit reached"),
        (status = 502, description = "Search or AI provider failure")
    )
)]
pub async fn generate_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<GenerateLeadsRequest>,
) -> Result<Json<GenerateLeadsResponse>, AppError> {
    let company_id = resolve_company(&state, &headers).await?;

    if payload.query.trim().is_empty() {
        return Err(AppError::BadRequest("query is required".to_string()));
    }
    let max_results = payload.max_results.unwrap_or(10).min(25);

    let evaluator = state.evaluator();
    evaluator
        .require_capacity(company_id, GatedFeature::AiQueries)
        .await?;
    evaluator
        .require_capacity(company_id, GatedFeature::Leads)
        .await?;

    let pipeline = LeadPipeline::new(&state.config, state.db.clone());
    let leads = pipeline
        .generate(company_id, payload.query.trim(), max_results)
        .await?;

    Ok(Json(GenerateLeadsResponse {
        created: leads.len(),
        leads,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_strings() {
        assert!(constant_time_compare("secret-token", "secret-token"));
    }

    #[test]
    fn constant_time_compare_rejects_differences() {
        assert!(!constant_time_compare("secret-token", "secret-tokeX"));
        assert!(!constant_time_compare("short", "longer-string"));
        assert!(!constant_time_compare("", "x"));
    }
}
