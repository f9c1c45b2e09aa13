use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub api_token: Option<String>, // Optional shared bearer token for the API
    pub mail_base_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub send_delay_ms: u64,
    pub ai_base_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    pub search_base_url: String,
    pub search_api_key: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            api_token: std::env::var("API_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            mail_base_url: std::env::var("MAIL_BASE_URL")
                .map_err(|_| anyhow::anyhow!("MAIL_BASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("MAIL_BASE_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("MAIL_BASE_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            mail_api_key: std::env::var("MAIL_API_KEY")
                .map_err(|_| anyhow::anyhow!("MAIL_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("MAIL_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            mail_from: std::env::var("MAIL_FROM")
                .map_err(|_| anyhow::anyhow!("MAIL_FROM environment variable required"))
                .and_then(|from| {
                    if !from.contains('@') {
                        anyhow::bail!("MAIL_FROM must be a sender email address");
                    }
                    Ok(from)
                })?,
            send_delay_ms: std::env::var("SEND_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEND_DELAY_MS must be a number of milliseconds"))?,
            ai_base_url: std::env::var("AI_BASE_URL")
                .map_err(|_| anyhow::anyhow!("AI_BASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("AI_BASE_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("AI_BASE_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            ai_api_key: std::env::var("AI_API_KEY")
                .map_err(|_| anyhow::anyhow!("AI_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("AI_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            ai_model: std::env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            search_base_url: std::env::var("SEARCH_BASE_URL")
                .map_err(|_| anyhow::anyhow!("SEARCH_BASE_URL environment variable required"))
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("SEARCH_BASE_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("SEARCH_BASE_URL must start with http:// or https://");
                    }
                    Ok(url)
                })?,
            search_api_key: std::env::var("SEARCH_API_KEY")
                .map_err(|_| anyhow::anyhow!("SEARCH_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("SEARCH_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Mail base URL: {}", config.mail_base_url);
        tracing::debug!("Mail sender: {}", config.mail_from);
        tracing::debug!("AI base URL: {} ({})", config.ai_base_url, config.ai_model);
        tracing::debug!("Search base URL: {}", config.search_base_url);
        tracing::debug!("Send delay: {}ms", config.send_delay_ms);
        if config.api_token.is_none() {
            tracing::warn!("API_TOKEN not set - requests will not require authentication");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
