use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::Lead;
use crate::services::{AiService, ExtractedLead, SearchService};
use crate::store::{log_ai_query, LeadStore, NewLead};
use regex::Regex;
use sqlx::PgPool;
use uuid::Uuid;

/// Lead generation: web search -> AI extraction -> tenant-scoped persistence.
///
/// Both provider calls are single-shot: a search or AI failure aborts the
/// whole operation before anything is written. An extraction that finds
/// nothing is a success with zero leads, not an error.
pub struct LeadPipeline {
    search: SearchService,
    ai: AiService,
    leads: LeadStore,
    pool: PgPool,
}

impl LeadPipeline {
    pub fn new(config: &Config, pool: PgPool) -> Self {
        Self {
            search: SearchService::new(config),
            ai: AiService::new(config),
            leads: LeadStore::new(pool.clone()),
            pool,
        }
    }

    pub async fn generate(
        &self,
        company_id: Uuid,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<Lead>, AppError> {
        tracing::info!(
            "Generating leads for company {} - query: {}",
            company_id,
            query
        );

        let pages = self.search.search(query, max_results).await?;
        if pages.is_empty() {
            tracing::info!("Search returned no pages for query: {}", query);
            log_ai_query(&self.pool, company_id, query, 0)
                .await
                .context("Failed to record AI usage")?;
            return Ok(Vec::new());
        }

        let extracted = self.ai.extract_leads(query, &pages).await?;
        let rows = sanitize_extracted(extracted);

        let created = self.leads.insert_many(company_id, &rows).await?;
        log_ai_query(&self.pool, company_id, query, created.len() as i32)
            .await
            .context("Failed to record AI usage")?;

        tracing::info!(
            "Stored {} lead(s) for company {} from query: {}",
            created.len(),
            company_id,
            query
        );
        Ok(created)
    }
}

/// Basic deliverability check for extracted addresses. Models occasionally
/// hallucinate placeholders; anything that does not look like
/// local@domain.tld is dropped rather than stored.
pub fn is_deliverable_email(email: &str) -> bool {
    let re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    re.is_match(email)
}

/// Turns raw model output into insertable rows: invalid emails and
/// unparseable provenance URLs are dropped to NULL, scores are clamped to
/// 0-100, and entries with no usable contact field at all are discarded.
pub fn sanitize_extracted(extracted: Vec<ExtractedLead>) -> Vec<NewLead> {
    extracted
        .into_iter()
        .filter_map(|lead| {
            let email = lead
                .email
                .filter(|e| is_deliverable_email(e));

            let has_contact = email.is_some()
                || lead.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
                || lead.name.as_deref().is_some_and(|n| !n.trim().is_empty());
            if !has_contact {
                return None;
            }

            let source_url = lead.source_url.filter(|u| url::Url::parse(u).is_ok());

            Some(NewLead {
                name: lead.name,
                email,
                phone: lead.phone,
                company_name: lead.company_name,
                score: lead.score.unwrap_or(0).clamp(0, 100),
                category: lead.category,
                source_url,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(email: Option<&str>, name: Option<&str>, score: Option<i32>) -> ExtractedLead {
        ExtractedLead {
            name: name.map(String::from),
            email: email.map(String::from),
            phone: None,
            company_name: None,
            score,
            category: None,
            source_url: None,
        }
    }

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_deliverable_email("ana@acme.com"));
        assert!(is_deliverable_email("first.last+tag@sub.example.co"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_deliverable_email("not-an-email"));
        assert!(!is_deliverable_email("missing@tld"));
        assert!(!is_deliverable_email("@example.com"));
        assert!(!is_deliverable_email("spaces in@example.com"));
        assert!(!is_deliverable_email(""));
    }

    #[test]
    fn invalid_email_is_nulled_but_lead_kept() {
        let rows = sanitize_extracted(vec![extracted(Some("bogus"), Some("Ana"), Some(70))]);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].email.is_none());
        assert_eq!(rows[0].name.as_deref(), Some("Ana"));
    }

    #[test]
    fn contactless_entries_are_discarded() {
        let rows = sanitize_extracted(vec![extracted(Some("bogus"), None, Some(70))]);
        assert!(rows.is_empty());
    }

    #[test]
    fn unparseable_source_urls_are_dropped() {
        let mut with_url = extracted(Some("a@x.com"), None, Some(70));
        with_url.source_url = Some("https://acme.com/contact".to_string());
        let mut with_junk = extracted(Some("b@x.com"), None, Some(70));
        with_junk.source_url = Some("see the homepage".to_string());

        let rows = sanitize_extracted(vec![with_url, with_junk]);
        assert_eq!(
            rows[0].source_url.as_deref(),
            Some("https://acme.com/contact")
        );
        assert!(rows[1].source_url.is_none());
    }

    #[test]
    fn scores_are_clamped() {
        let rows = sanitize_extracted(vec![
            extracted(Some("a@x.com"), None, Some(250)),
            extracted(Some("b@x.com"), None, Some(-5)),
            extracted(Some("c@x.com"), None, None),
        ]);
        assert_eq!(rows[0].score, 100);
        assert_eq!(rows[1].score, 0);
        assert_eq!(rows[2].score, 0);
    }
}
