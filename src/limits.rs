use crate::cache_validator::SealedEntry;
use crate::errors::{AppError, ResultExt};
use crate::models::{FeatureUsage, LimitCheckResponse, Plan, UsageResponse};
use moka::future::Cache;
use sqlx::PgPool;
use uuid::Uuid;

/// The closed set of plan-gated features. Each variant maps to one backing
/// table whose per-company row count is the feature's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedFeature {
    Products,
    Invoices,
    Quotes,
    Leads,
    Campaigns,
    AiQueries,
}

impl GatedFeature {
    pub const ALL: [GatedFeature; 6] = [
        GatedFeature::Products,
        GatedFeature::Invoices,
        GatedFeature::Quotes,
        GatedFeature::Leads,
        GatedFeature::Campaigns,
        GatedFeature::AiQueries,
    ];

    /// Parses a feature name. Anything outside the enumerated set is an
    /// `InvalidFeature` error, surfaced before any database work.
    pub fn parse(name: &str) -> Result<Self, AppError> {
        match name {
            "products" => Ok(GatedFeature::Products),
            "invoices" => Ok(GatedFeature::Invoices),
            "quotes" => Ok(GatedFeature::Quotes),
            "leads" => Ok(GatedFeature::Leads),
            "campaigns" => Ok(GatedFeature::Campaigns),
            "ai_queries" => Ok(GatedFeature::AiQueries),
            other => Err(AppError::InvalidFeature(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatedFeature::Products => "products",
            GatedFeature::Invoices => "invoices",
            GatedFeature::Quotes => "quotes",
            GatedFeature::Leads => "leads",
            GatedFeature::Campaigns => "campaigns",
            GatedFeature::AiQueries => "ai_queries",
        }
    }

    /// The plan column that caps this feature. None = unlimited.
    pub fn limit_of(&self, plan: &Plan) -> Option<i64> {
        match self {
            GatedFeature::Products => plan.max_products,
            GatedFeature::Invoices => plan.max_invoices,
            GatedFeature::Quotes => plan.max_quotes,
            GatedFeature::Leads => plan.max_leads,
            GatedFeature::Campaigns => plan.max_campaigns,
            GatedFeature::AiQueries => plan.max_ai_queries,
        }
    }

    /// Count query for the feature's backing table. Static strings only;
    /// the company id is the single bound parameter.
    fn count_query(&self) -> &'static str {
        match self {
            GatedFeature::Products => "SELECT COUNT(*) FROM app.products WHERE company_id = $1",
            GatedFeature::Invoices => "SELECT COUNT(*) FROM app.invoices WHERE company_id = $1",
            GatedFeature::Quotes => "SELECT COUNT(*) FROM app.quotes WHERE company_id = $1",
            GatedFeature::Leads => "SELECT COUNT(*) FROM app.leads WHERE company_id = $1",
            GatedFeature::Campaigns => "SELECT COUNT(*) FROM app.campaigns WHERE company_id = $1",
            GatedFeature::AiQueries => {
                "SELECT COUNT(*) FROM app.ai_query_log WHERE company_id = $1"
            }
        }
    }
}

/// The decision rule, separated out so the truth table is testable without a
/// database: unlimited plans always allow, otherwise strictly-below-limit
/// allows.
pub fn is_allowed(limit: Option<i64>, current: i64) -> bool {
    match limit {
        None => true,
        Some(l) => current < l,
    }
}

/// Evaluates plan limits for a company.
///
/// This is a pure read: it does not claim or reserve a slot, so two
/// near-simultaneous creations can both pass the check and briefly exceed
/// the limit by the number of concurrent callers. The overage is bounded
/// and accepted; creation is not serialized through this check.
pub struct LimitEvaluator {
    pool: PgPool,
    plan_cache: Cache<Uuid, String>,
}

impl LimitEvaluator {
    pub fn new(pool: PgPool, plan_cache: Cache<Uuid, String>) -> Self {
        Self { pool, plan_cache }
    }

    /// Resolve the company's active plan, via the cache when possible.
    /// Counts are never cached - only the plan row, which changes rarely.
    async fn resolve_plan(&self, company_id: Uuid) -> Result<Plan, AppError> {
        if let Some(cached) = self.plan_cache.get(&company_id).await {
            if let Some(valid) = SealedEntry::open(&cached) {
                if let Ok(plan) = serde_json::from_str::<Plan>(&valid) {
                    tracing::debug!("Plan cache HIT for company {}", company_id);
                    return Ok(plan);
                }
            } else {
                tracing::warn!(
                    "Plan cache entry failed validation for company {}, re-reading",
                    company_id
                );
            }
        }

        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT p.* FROM app.plans p
            JOIN app.subscriptions s ON s.plan_id = p.id
            WHERE s.company_id = $1 AND s.status = 'active'
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to resolve company plan")?
        .ok_or_else(|| {
            AppError::NoPlanFound(format!("No active plan for company {}", company_id))
        })?;

        if let Ok(json) = serde_json::to_string(&plan) {
            self.plan_cache
                .insert(company_id, SealedEntry::seal(json))
                .await;
        }

        Ok(plan)
    }

    /// Decide whether the company may create one more unit of the feature.
    pub async fn check(
        &self,
        company_id: Uuid,
        feature: GatedFeature,
    ) -> Result<LimitCheckResponse, AppError> {
        let plan = self.resolve_plan(company_id).await?;
        let limit = feature.limit_of(&plan);

        let current: i64 = sqlx::query_scalar(feature.count_query())
            .bind(company_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count feature usage")?;

        let allowed = is_allowed(limit, current);
        tracing::debug!(
            "Limit check: company={} feature={} current={} limit={:?} allowed={}",
            company_id,
            feature.as_str(),
            current,
            limit,
            allowed
        );

        Ok(LimitCheckResponse {
            feature: feature.as_str().to_string(),
            allowed,
            current,
            limit,
        })
    }

    /// Like `check`, but turns a denial into an error so creation handlers
    /// can gate with a single `?`.
    pub async fn require_capacity(
        &self,
        company_id: Uuid,
        feature: GatedFeature,
    ) -> Result<(), AppError> {
        let check = self.check(company_id, feature).await?;
        if check.allowed {
            return Ok(());
        }

        // A denial without a concrete limit means the rule itself is broken
        let limit = check.limit.ok_or_else(|| {
            AppError::InternalError(format!(
                "Limit check denied {} without a configured limit",
                check.feature
            ))
        })?;

        Err(AppError::LimitExceeded {
            feature: check.feature,
            current: check.current,
            limit,
        })
    }

    /// Usage across every gated feature, for the account dashboard.
    pub async fn usage_summary(&self, company_id: Uuid) -> Result<UsageResponse, AppError> {
        let plan = self.resolve_plan(company_id).await?;

        let mut features = Vec::with_capacity(GatedFeature::ALL.len());
        for feature in GatedFeature::ALL {
            let limit = feature.limit_of(&plan);
            let current: i64 = sqlx::query_scalar(feature.count_query())
                .bind(company_id)
                .fetch_one(&self.pool)
                .await?;

            features.push(FeatureUsage {
                feature: feature.as_str().to_string(),
                current,
                limit,
                allowed: is_allowed(limit, current),
            });
        }

        Ok(UsageResponse {
            company_id,
            plan: plan.name,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_feature_fails_to_parse() {
        for name in ["widgets", "", "PRODUCTS", "ai-queries", "invoices "] {
            assert!(matches!(
                GatedFeature::parse(name),
                Err(AppError::InvalidFeature(_))
            ));
        }
    }

    #[test]
    fn every_feature_round_trips_through_its_name() {
        for feature in GatedFeature::ALL {
            assert_eq!(GatedFeature::parse(feature.as_str()).unwrap(), feature);
        }
    }

    #[test]
    fn null_limit_always_allows() {
        assert!(is_allowed(None, 0));
        assert!(is_allowed(None, 1_000_000));
    }

    #[test]
    fn at_limit_denies() {
        // Plan caps invoices at 50 and the tenant already has 50 rows.
        assert!(!is_allowed(Some(50), 50));
        assert!(!is_allowed(Some(50), 51));
    }

    #[test]
    fn below_limit_allows() {
        assert!(is_allowed(Some(50), 49));
        assert!(is_allowed(Some(1), 0));
    }

    #[test]
    fn zero_limit_denies_everything() {
        assert!(!is_allowed(Some(0), 0));
    }
}
