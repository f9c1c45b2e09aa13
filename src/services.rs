use crate::config::Config;
use crate::errors::AppError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Client for the transactional mail provider.
///
/// One call is one attempt: retry and backoff are the caller's business,
/// and the dispatcher deliberately never retries (a retry is a new dispatch
/// with an explicit recipient subset).
pub struct MailService {
    client: Client,
    base_url: String,
    api_key: String,
}

/// A rendered, ready-to-send message.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MailService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: config.mail_base_url.clone(),
            api_key: config.mail_api_key.clone(),
        }
    }

    /// Sends one message. Returns the provider message id on success; any
    /// non-2xx status or transport error comes back as `ExternalApiError`
    /// with the provider's response body attached.
    pub async fn send(&self, message: &OutboundEmail) -> Result<String, AppError> {
        let url = format!("{}/emails", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(message)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Mail request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Mail provider returned {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse mail response: {}", e))
        })?;

        let provider_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::ExternalApiError("Mail response missing 'id' field".to_string())
            })?
            .to_string();

        Ok(provider_id)
    }
}

/// Client for the web-search provider used by lead generation.
pub struct SearchService {
    client: Client,
    base_url: String,
    api_key: String,
}

/// One search result page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

impl SearchService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: config.search_base_url.clone(),
            api_key: config.search_api_key.clone(),
        }
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, AppError> {
        let url = format!("{}/search", self.base_url);
        tracing::info!("Searching for: {} (limit {})", query, limit);

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "query": query, "limit": limit }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Search provider returned error {}: {}", status, error_text);
            return Err(AppError::ExternalApiError(format!(
                "Search provider returned {}: {}",
                status, error_text
            )));
        }

        let result: SearchResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse search response: {}", e))
        })?;

        tracing::info!("Search returned {} result(s)", result.results.len());
        Ok(result.results)
    }
}

/// Client for the AI completion provider. Extraction uses a forced
/// function-call so the model's answer is always machine-readable JSON.
pub struct AiService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// One business contact extracted by the model from search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLead {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub score: Option<i32>,
    pub category: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedLeadList {
    leads: Vec<ExtractedLead>,
}

impl AiService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: config.ai_base_url.clone(),
            api_key: config.ai_api_key.clone(),
            model: config.ai_model.clone(),
        }
    }

    /// Asks the model to pull business contacts out of the search results.
    pub async fn extract_leads(
        &self,
        query: &str,
        pages: &[SearchHit],
    ) -> Result<Vec<ExtractedLead>, AppError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::info!("Extracting leads from {} page(s)", pages.len());

        let mut corpus = String::new();
        for page in pages {
            // Cap per-page content so a single large page cannot blow the
            // model's context window.
            let content: String = page.content.chars().take(2000).collect();
            corpus.push_str(&format!(
                "URL: {}\nTitle: {}\n{}\n\n",
                page.url, page.title, content
            ));
        }

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You extract business contact information from web pages. \
                                Only report contacts actually present in the text. Score each \
                                lead 0-100 by how well it matches the user's query."
                },
                {
                    "role": "user",
                    "content": format!("Query: {}\n\nPages:\n{}", query, corpus)
                }
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "record_leads",
                    "description": "Record the business leads found in the pages",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "leads": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string" },
                                        "email": { "type": "string" },
                                        "phone": { "type": "string" },
                                        "company_name": { "type": "string" },
                                        "score": { "type": "integer" },
                                        "category": { "type": "string" },
                                        "source_url": { "type": "string" }
                                    }
                                }
                            }
                        },
                        "required": ["leads"]
                    }
                }
            }],
            "tool_choice": { "type": "function", "function": { "name": "record_leads" } }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("AI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("AI provider returned error {}: {}", status, error_text);
            return Err(AppError::ExternalApiError(format!(
                "AI provider returned {}: {}",
                status, error_text
            )));
        }

        let completion: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse AI response: {}", e))
        })?;

        let leads = parse_tool_arguments(&completion)?;
        tracing::info!("Model extracted {} lead(s)", leads.len());
        Ok(leads)
    }
}

/// Pulls the forced tool call's arguments out of a chat-completion response
/// and deserializes them.
pub fn parse_tool_arguments(completion: &Value) -> Result<Vec<ExtractedLead>, AppError> {
    let arguments = completion
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("tool_calls"))
        .and_then(|t| t.get(0))
        .and_then(|t| t.get("function"))
        .and_then(|f| f.get("arguments"))
        .and_then(|a| a.as_str())
        .ok_or_else(|| {
            AppError::ExternalApiError("AI response missing tool call arguments".to_string())
        })?;

    let parsed: ExtractedLeadList = serde_json::from_str(arguments).map_err(|e| {
        AppError::ExternalApiError(format!("Failed to parse extracted leads: {}", e))
    })?;

    Ok(parsed.leads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion_with(arguments: &str) -> Value {
        json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": {
                            "name": "record_leads",
                            "arguments": arguments
                        }
                    }]
                }
            }]
        })
    }

    #[test]
    fn parses_leads_from_tool_call() {
        let completion = completion_with(
            r#"{"leads":[{"name":"Ana","email":"ana@acme.com","company_name":"Acme","score":85}]}"#,
        );

        let leads = parse_tool_arguments(&completion).unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].email.as_deref(), Some("ana@acme.com"));
        assert_eq!(leads[0].score, Some(85));
    }

    #[test]
    fn empty_lead_list_is_ok() {
        let completion = completion_with(r#"{"leads":[]}"#);
        assert!(parse_tool_arguments(&completion).unwrap().is_empty());
    }

    #[test]
    fn missing_tool_call_is_an_error() {
        let completion = json!({"choices": [{"message": {"content": "no tools here"}}]});
        assert!(parse_tool_arguments(&completion).is_err());
    }

    #[test]
    fn malformed_arguments_are_an_error() {
        let completion = completion_with("{not json");
        assert!(parse_tool_arguments(&completion).is_err());
    }
}
