/// Integration tests with mocked external providers
/// Tests the mail, search and AI clients without hitting real services
use rust_bizops_api::config::Config;
use rust_bizops_api::services::{AiService, MailService, OutboundEmail, SearchService};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(base_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 8080,
        api_token: Some("test_token".to_string()),
        mail_base_url: base_url.clone(),
        mail_api_key: "test_mail_key".to_string(),
        mail_from: "noreply@bizops.test".to_string(),
        send_delay_ms: 0,
        ai_base_url: base_url.clone(),
        ai_api_key: "test_ai_key".to_string(),
        ai_model: "test-model".to_string(),
        search_base_url: base_url,
        search_api_key: "test_search_key".to_string(),
    }
}

fn test_message(to: &str) -> OutboundEmail {
    OutboundEmail {
        from: "noreply@bizops.test".to_string(),
        to: to.to_string(),
        subject: "Hi there".to_string(),
        html: "<p>Hello</p>".to_string(),
        text: None,
    }
}

#[tokio::test]
async fn test_mail_send_success_returns_provider_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("Authorization", "Bearer test_mail_key"))
        .and(body_partial_json(
            serde_json::json!({"to": "ana@acme.com", "subject": "Hi there"}),
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_123"})),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = MailService::new(&config);

    let result = service.send(&test_message("ana@acme.com")).await;

    assert_eq!(result.unwrap(), "msg_123");
}

#[tokio::test]
async fn test_mail_provider_error_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid recipient"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = MailService::new(&config);

    let result = service.send(&test_message("bad@recipient")).await;

    assert!(result.is_err());
    let message = result.unwrap_err().to_string();
    assert!(message.contains("422"));
    assert!(message.contains("invalid recipient"));
}

#[tokio::test]
async fn test_mail_response_without_id_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = MailService::new(&config);

    let result = service.send(&test_message("ana@acme.com")).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_search_success() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "results": [
            {"url": "https://acme.com", "title": "Acme Inc", "content": "Contact: ana@acme.com"},
            {"url": "https://globex.com", "title": "Globex", "content": "Call us"}
        ]
    });

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("X-API-KEY", "test_search_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = SearchService::new(&config);

    let hits = service.search("plumbers in austin", 10).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].url, "https://acme.com");
}

#[tokio::test]
async fn test_search_empty_results() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = SearchService::new(&config);

    let hits = service.search("nothing out there", 10).await.unwrap();

    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_search_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = SearchService::new(&config);

    let result = service.search("plumbers in austin", 10).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_ai_extraction_end_to_end() {
    let mock_server = MockServer::start().await;

    let arguments = serde_json::json!({
        "leads": [
            {"name": "Ana Souza", "email": "ana@acme.com", "company_name": "Acme", "score": 88},
            {"name": "Bob Lee", "email": "bob@globex.com", "company_name": "Globex", "score": 61}
        ]
    })
    .to_string();

    let completion = serde_json::json!({
        "choices": [{
            "message": {
                "tool_calls": [{
                    "function": { "name": "record_leads", "arguments": arguments }
                }]
            }
        }]
    });

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test_ai_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&completion))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AiService::new(&config);

    let pages = vec![rust_bizops_api::services::SearchHit {
        url: "https://acme.com".to_string(),
        title: "Acme".to_string(),
        content: "Contact ana@acme.com".to_string(),
    }];

    let leads = service.extract_leads("tech companies", &pages).await.unwrap();

    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0].email.as_deref(), Some("ana@acme.com"));
    assert_eq!(leads[1].score, Some(61));
}

#[tokio::test]
async fn test_ai_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AiService::new(&config);

    let result = service.extract_leads("anything", &[]).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_concurrent_mail_sends() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg_n"})),
        )
        .expect(10)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());

    // Fire 10 concurrent sends; each invocation is independent
    let mut handles = vec![];
    for i in 0..10 {
        let config_clone = config.clone();
        let handle = tokio::spawn(async move {
            let service = MailService::new(&config_clone);
            service
                .send(&test_message(&format!("user{}@example.com", i)))
                .await
        });
        handles.push(handle);
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
