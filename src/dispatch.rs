use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{DispatchResponse, Lead};
use crate::services::{MailService, OutboundEmail};
use crate::store::{CampaignStore, LeadStore};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// True when the lead has an address the provider could plausibly accept.
/// Leads without one are silently excluded from a dispatch and do not count
/// toward its total.
pub fn has_sendable_email(lead: &Lead) -> bool {
    match lead.email.as_deref() {
        Some(email) => !email.trim().is_empty() && email.contains('@'),
        None => false,
    }
}

/// Substitutes the named placeholders with recipient fields. Absent or
/// blank fields fall back to generic text so a rendered greeting never
/// reads "Hi ,". Replacement is literal - the body is expected to be
/// pre-sanitized, nothing is escaped here.
pub fn render_template(template: &str, lead: &Lead) -> String {
    let name = field_or(lead.name.as_deref(), "there");
    let company = field_or(lead.company_name.as_deref(), "your company");
    let email = lead.email.as_deref().unwrap_or("");

    template
        .replace("{{name}}", name)
        .replace("{{company}}", company)
        .replace("{{email}}", email)
}

fn field_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => fallback,
    }
}

/// Runs campaign sends.
///
/// The loop is strictly sequential with a configured delay between
/// iterations - a throttle against the mail provider's rate limit, which
/// makes dispatch latency linear in recipient count. Partial failure is the
/// expected steady state: a provider error marks that recipient failed and
/// the loop continues. The campaign itself always ends `sent` once the loop
/// completes; "did the job finish" and "did every message deliver" are
/// answered by different fields.
pub struct CampaignDispatcher {
    mail: MailService,
    campaigns: CampaignStore,
    leads: LeadStore,
    from: String,
    delay: Duration,
}

impl CampaignDispatcher {
    pub fn new(config: &Config, pool: PgPool) -> Self {
        Self {
            mail: MailService::new(config),
            campaigns: CampaignStore::new(pool.clone()),
            leads: LeadStore::new(pool),
            from: config.mail_from.clone(),
            delay: Duration::from_millis(config.send_delay_ms),
        }
    }

    /// Sends the campaign to every eligible recipient and reports
    /// `{total, sent, failed}`.
    ///
    /// With `subset` given, only those lead ids are considered - this is
    /// also the retry path, since failed recipients are never retried
    /// automatically. Without it, every lead of the company is a candidate.
    pub async fn dispatch(
        &self,
        company_id: Uuid,
        campaign_id: Uuid,
        subset: Option<&[Uuid]>,
    ) -> Result<DispatchResponse, AppError> {
        let campaign = self
            .campaigns
            .get(company_id, campaign_id)
            .await
            .context("Failed to load campaign for dispatch")?
            .ok_or_else(|| AppError::NotFound(format!("Campaign {} not found", campaign_id)))?;

        let candidates = match subset {
            Some(ids) => self.leads.get_many(company_id, ids).await?,
            None => self.leads.list(company_id).await?,
        };

        let eligible: Vec<Lead> = candidates.into_iter().filter(has_sendable_email).collect();

        if eligible.is_empty() {
            // Structural precondition failure: nothing was sent and the
            // campaign status is left untouched.
            return Err(AppError::NoEligibleRecipients(format!(
                "Campaign {} has no recipients with an email address",
                campaign_id
            )));
        }

        let total = eligible.len();
        self.campaigns
            .mark_sending(company_id, campaign_id, total as i32)
            .await?;
        tracing::info!(
            "Dispatching campaign {} to {} recipient(s)",
            campaign_id,
            total
        );

        let mut sent = 0usize;
        let mut failed = 0usize;

        for (i, lead) in eligible.iter().enumerate() {
            let message = OutboundEmail {
                from: self.from.clone(),
                to: lead.email.clone().unwrap_or_default(),
                subject: render_template(&campaign.subject, lead),
                html: render_template(&campaign.body_html, lead),
                text: campaign
                    .body_text
                    .as_ref()
                    .map(|t| render_template(t, lead)),
            };

            match self.mail.send(&message).await {
                Ok(provider_id) => {
                    sent += 1;
                    tracing::debug!("Sent to lead {} (provider id {})", lead.id, provider_id);
                    if let Err(e) = self
                        .campaigns
                        .record_email(campaign_id, lead.id, "sent", Some(&provider_id), None)
                        .await
                    {
                        // The message is already out; losing the record must
                        // not abort the rest of the loop.
                        tracing::error!("Failed to record sent email for {}: {}", lead.id, e);
                    }
                }
                Err(e) => {
                    failed += 1;
                    let reason = e.to_string();
                    tracing::warn!("Send failed for lead {}: {}", lead.id, reason);
                    if let Err(e) = self
                        .campaigns
                        .record_email(campaign_id, lead.id, "failed", None, Some(&reason))
                        .await
                    {
                        tracing::error!("Failed to record failed email for {}: {}", lead.id, e);
                    }
                }
            }

            // Provider rate-limit throttle between sends
            if i + 1 < total {
                tokio::time::sleep(self.delay).await;
            }
        }

        self.campaigns
            .mark_sent(company_id, campaign_id, sent as i32, failed as i32)
            .await?;
        tracing::info!(
            "Campaign {} complete: {} sent, {} failed of {}",
            campaign_id,
            sent,
            failed,
            total
        );

        Ok(DispatchResponse {
            total,
            sent,
            failed,
        })
    }
}
