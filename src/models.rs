use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ============ Database Models ============

/// A company account. Every business record in the system is owned by
/// exactly one company; nothing is readable across company boundaries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Company {
    /// Unique identifier for the company.
    pub id: Uuid,
    /// Display name of the company.
    pub name: String,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// A subscription plan tier. Each `max_*` column is the ceiling for one
/// gated feature; NULL means unlimited.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier for the plan.
    pub id: Uuid,
    /// Plan name (e.g., "starter", "growth").
    pub name: String,
    /// Maximum number of products, NULL = unlimited.
    pub max_products: Option<i64>,
    /// Maximum number of invoices, NULL = unlimited.
    pub max_invoices: Option<i64>,
    /// Maximum number of quotes, NULL = unlimited.
    pub max_quotes: Option<i64>,
    /// Maximum number of leads, NULL = unlimited.
    pub max_leads: Option<i64>,
    /// Maximum number of campaigns, NULL = unlimited.
    pub max_campaigns: Option<i64>,
    /// Maximum number of AI lead-generation queries, NULL = unlimited.
    pub max_ai_queries: Option<i64>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// A prospective contact, either entered manually or produced by the
/// lead-generation pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Lead {
    /// Unique identifier for the lead.
    pub id: Uuid,
    /// The company that owns this lead.
    pub company_id: Uuid,
    /// Contact name.
    pub name: Option<String>,
    /// Contact email address.
    pub email: Option<String>,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Name of the contact's business.
    pub company_name: Option<String>,
    /// Relevance score, 0-100.
    pub score: i32,
    /// Category label (e.g., "restaurant", "law firm").
    pub category: Option<String>,
    /// URL the lead was extracted from.
    pub source_url: Option<String>,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
}

/// A bulk personalized-email send job targeting the company's leads.
///
/// Status progresses draft -> sending -> sent. There is no failed terminal
/// state for the campaign itself; failures are tracked per recipient.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    /// Unique identifier for the campaign.
    pub id: Uuid,
    /// The company that owns this campaign.
    pub company_id: Uuid,
    /// Campaign name.
    pub name: String,
    /// Message subject template.
    pub subject: String,
    /// HTML body template.
    pub body_html: String,
    /// Optional plain-text body template.
    pub body_text: Option<String>,
    /// Campaign status ("draft", "sending", "sent").
    pub status: String,
    /// Number of eligible recipients at dispatch time.
    pub total_recipients: i32,
    /// Number of messages accepted by the provider.
    pub total_sent: i32,
    /// Number of messages the provider rejected or that errored.
    pub total_bounced: i32,
    /// Timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp the dispatch loop finished.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One send attempt for one (campaign, lead) pair. Written exactly once
/// per recipient per dispatch invocation and never mutated afterwards;
/// retrying a failed recipient is a new dispatch with an explicit subset.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct CampaignEmail {
    /// Unique identifier for the record.
    pub id: Uuid,
    /// The campaign this attempt belongs to.
    pub campaign_id: Uuid,
    /// The lead this attempt targeted.
    pub lead_id: Uuid,
    /// Delivery status ("sent", "failed").
    pub status: String,
    /// Provider message id on success.
    pub provider_message_id: Option<String>,
    /// Provider or transport error on failure.
    pub error_message: Option<String>,
    /// Timestamp of the attempt.
    pub sent_at: DateTime<Utc>,
}

// ============ API Request/Response Models ============

/// Request payload for creating a draft campaign.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCampaignRequest {
    /// Campaign name.
    pub name: String,
    /// Message subject template.
    pub subject: String,
    /// HTML body template.
    pub body_html: String,
    /// Optional plain-text body template.
    pub body_text: Option<String>,
}

/// Request payload for dispatching a campaign.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DispatchRequest {
    /// Restrict the send to these lead ids. Omitted = all company leads.
    pub recipient_ids: Option<Vec<Uuid>>,
}

/// Aggregate outcome of one dispatch invocation.
#[derive(Debug, Serialize, ToSchema)]
pub struct DispatchResponse {
    /// Eligible recipients processed.
    pub total: usize,
    /// Messages the provider accepted.
    pub sent: usize,
    /// Messages that failed at the provider or in transport.
    pub failed: usize,
}

/// Result of a feature limit check.
#[derive(Debug, Serialize, ToSchema)]
pub struct LimitCheckResponse {
    /// The gated feature that was checked.
    pub feature: String,
    /// Whether the company may create one more unit.
    pub allowed: bool,
    /// Rows currently owned by the company for this feature.
    pub current: i64,
    /// The plan's limit, None = unlimited.
    pub limit: Option<i64>,
}

/// Per-feature entry in the usage summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeatureUsage {
    /// The gated feature.
    pub feature: String,
    /// Rows currently owned by the company.
    pub current: i64,
    /// The plan's limit, None = unlimited.
    pub limit: Option<i64>,
    /// Whether one more unit may be created.
    pub allowed: bool,
}

/// Usage summary across all gated features.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    /// The company the summary describes.
    pub company_id: Uuid,
    /// The resolved plan name.
    pub plan: String,
    /// One entry per gated feature.
    pub features: Vec<FeatureUsage>,
}

/// Request payload for AI lead generation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateLeadsRequest {
    /// Free-text description of the businesses to find.
    pub query: String,
    /// Cap on search results to read (default 10).
    pub max_results: Option<u32>,
}

/// Response payload for AI lead generation.
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateLeadsResponse {
    /// Number of leads persisted.
    pub created: usize,
    /// The persisted leads.
    pub leads: Vec<Lead>,
}
