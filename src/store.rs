use crate::errors::{AppError, ResultExt};
use crate::models::{Campaign, CampaignEmail, Company, CreateCampaignRequest, Lead};
use sqlx::PgPool;
use uuid::Uuid;

/// Tenant-scoped data access.
///
/// Every method takes the owning company id explicitly and folds it into the
/// WHERE clause; there is deliberately no variant that reads unscoped. The
/// handlers resolve the tenant once and thread it through, so cross-tenant
/// access is impossible by construction rather than by convention.

pub struct CompanyStore {
    pool: PgPool,
}

impl CompanyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        let company =
            sqlx::query_as::<_, Company>("SELECT * FROM app.companies WHERE id = $1 LIMIT 1")
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(company)
    }
}

pub struct LeadStore {
    pool: PgPool,
}

/// Insert payload for a lead produced by the generation pipeline.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub score: i32,
    pub category: Option<String>,
    pub source_url: Option<String>,
}

impl LeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All leads owned by the company, newest first.
    pub async fn list(&self, company_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            "SELECT * FROM app.leads WHERE company_id = $1 ORDER BY created_at DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(leads)
    }

    /// The subset of the given ids that the company actually owns.
    /// Ids belonging to another tenant simply do not come back.
    pub async fn get_many(&self, company_id: Uuid, ids: &[Uuid]) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            "SELECT * FROM app.leads WHERE company_id = $1 AND id = ANY($2) ORDER BY created_at",
        )
        .bind(company_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(leads)
    }

    pub async fn insert_many(
        &self,
        company_id: Uuid,
        rows: &[NewLead],
    ) -> Result<Vec<Lead>, AppError> {
        let mut created = Vec::with_capacity(rows.len());

        for row in rows {
            let lead = sqlx::query_as::<_, Lead>(
                r#"
                INSERT INTO app.leads
                    (id, company_id, name, email, phone, company_name, score, category, source_url, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(company_id)
            .bind(&row.name)
            .bind(&row.email)
            .bind(&row.phone)
            .bind(&row.company_name)
            .bind(row.score)
            .bind(&row.category)
            .bind(&row.source_url)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to store generated lead for company {}", company_id))?;

            created.push(lead);
        }

        Ok(created)
    }
}

pub struct CampaignStore {
    pool: PgPool,
}

impl CampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        company_id: Uuid,
        req: &CreateCampaignRequest,
    ) -> Result<Campaign, AppError> {
        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO app.campaigns
                (id, company_id, name, subject, body_html, body_text, status,
                 total_recipients, total_sent, total_bounced, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'draft', 0, 0, 0, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(&req.name)
        .bind(&req.subject)
        .bind(&req.body_html)
        .bind(&req.body_text)
        .fetch_one(&self.pool)
        .await?;

        Ok(campaign)
    }

    pub async fn get(
        &self,
        company_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>, AppError> {
        let campaign = sqlx::query_as::<_, Campaign>(
            "SELECT * FROM app.campaigns WHERE company_id = $1 AND id = $2 LIMIT 1",
        )
        .bind(company_id)
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(campaign)
    }

    /// Transition to `sending` and pin the eligible recipient count.
    pub async fn mark_sending(
        &self,
        company_id: Uuid,
        campaign_id: Uuid,
        total_recipients: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE app.campaigns SET status = 'sending', total_recipients = $3
             WHERE company_id = $1 AND id = $2",
        )
        .bind(company_id)
        .bind(campaign_id)
        .bind(total_recipients)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Transition to `sent` with the final counters. The campaign reaches
    /// `sent` once the loop completes regardless of how many sends failed.
    pub async fn mark_sent(
        &self,
        company_id: Uuid,
        campaign_id: Uuid,
        total_sent: i32,
        total_bounced: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE app.campaigns
             SET status = 'sent', total_sent = $3, total_bounced = $4, completed_at = NOW()
             WHERE company_id = $1 AND id = $2",
        )
        .bind(company_id)
        .bind(campaign_id)
        .bind(total_sent)
        .bind(total_bounced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one send attempt. Called once per recipient, immediately after
    /// the attempt, so a mid-loop interruption cannot lose confirmed
    /// outcomes.
    pub async fn record_email(
        &self,
        campaign_id: Uuid,
        lead_id: Uuid,
        status: &str,
        provider_message_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO app.campaign_emails
                (id, campaign_id, lead_id, status, provider_message_id, error_message, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(campaign_id)
        .bind(lead_id)
        .bind(status)
        .bind(provider_message_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("Failed to record send outcome")?;

        Ok(())
    }

    /// Send records for a campaign, in attempt order.
    #[allow(dead_code)]
    pub async fn list_emails(
        &self,
        company_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<CampaignEmail>, AppError> {
        let records = sqlx::query_as::<_, CampaignEmail>(
            r#"
            SELECT ce.* FROM app.campaign_emails ce
            JOIN app.campaigns c ON c.id = ce.campaign_id
            WHERE c.company_id = $1 AND ce.campaign_id = $2
            ORDER BY ce.sent_at ASC
            "#,
        )
        .bind(company_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

/// Append one row to the AI usage log. These rows are the backing entity the
/// `ai_queries` gating check counts.
pub async fn log_ai_query(
    pool: &PgPool,
    company_id: Uuid,
    query: &str,
    leads_found: i32,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO app.ai_query_log (id, company_id, query, leads_found, created_at)
         VALUES ($1, $2, $3, $4, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(query)
    .bind(leads_found)
    .execute(pool)
    .await?;

    Ok(())
}
