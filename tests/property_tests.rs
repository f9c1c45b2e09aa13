/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use chrono::Utc;
use proptest::prelude::*;
use rust_bizops_api::dispatch::{has_sendable_email, render_template};
use rust_bizops_api::limits::is_allowed;
use rust_bizops_api::models::Lead;
use rust_bizops_api::pipeline::{is_deliverable_email, sanitize_extracted};
use rust_bizops_api::services::ExtractedLead;
use uuid::Uuid;

fn lead_with(name: Option<String>, email: Option<String>, company_name: Option<String>) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        name,
        email,
        phone: None,
        company_name,
        score: 0,
        category: None,
        source_url: None,
        created_at: Utc::now(),
    }
}

// Property: template rendering should never panic
proptest! {
    #[test]
    fn rendering_never_panics(
        template in "\\PC*",
        name in proptest::option::of("\\PC*"),
        email in proptest::option::of("\\PC*"),
        company in proptest::option::of("\\PC*")
    ) {
        let lead = lead_with(name, email, company);
        let _ = render_template(&template, &lead);
        let _ = has_sendable_email(&lead);
    }

    #[test]
    fn known_placeholders_never_survive_rendering(
        template in "([a-zA-Z ,.!]|\\{\\{name\\}\\}|\\{\\{company\\}\\}|\\{\\{email\\}\\}){0,40}",
        name in proptest::option::of("[a-zA-Z0-9 ]{0,20}"),
        email in proptest::option::of("[a-z0-9@.]{0,20}"),
        company in proptest::option::of("[a-zA-Z0-9 ]{0,20}")
    ) {
        let lead = lead_with(name, email, company);
        let rendered = render_template(&template, &lead);

        prop_assert!(!rendered.contains("{{name}}"));
        prop_assert!(!rendered.contains("{{company}}"));
        prop_assert!(!rendered.contains("{{email}}"));
    }

    #[test]
    fn greeting_always_has_a_name_or_fallback(
        name in proptest::option::of("[a-zA-Z]{1,20}")
    ) {
        let lead = lead_with(name.clone(), Some("a@x.com".to_string()), None);
        let rendered = render_template("Hi {{name}},", &lead);

        match name {
            Some(n) => prop_assert_eq!(rendered, format!("Hi {},", n)),
            None => prop_assert_eq!(rendered, "Hi there,"),
        }
    }
}

// Property: the gating rule is exactly "unlimited or strictly below"
proptest! {
    #[test]
    fn allowed_matches_strictly_below(limit in 0i64..10_000, current in 0i64..20_000) {
        prop_assert_eq!(is_allowed(Some(limit), current), current < limit);
    }

    #[test]
    fn unlimited_never_denies(current in 0i64..1_000_000) {
        prop_assert!(is_allowed(None, current));
    }

    #[test]
    fn denial_implies_at_or_over_limit(limit in 0i64..10_000, current in 0i64..20_000) {
        if !is_allowed(Some(limit), current) {
            prop_assert!(current >= limit);
        }
    }
}

// Property: extracted-lead sanitization bounds
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_deliverable_email(&email);
    }

    #[test]
    fn sanitized_scores_stay_in_range(score in proptest::option::of(-1000i32..1000)) {
        let rows = sanitize_extracted(vec![ExtractedLead {
            name: Some("Ana".to_string()),
            email: Some("ana@acme.com".to_string()),
            phone: None,
            company_name: None,
            score,
            category: None,
            source_url: None,
        }]);

        prop_assert_eq!(rows.len(), 1);
        prop_assert!((0..=100).contains(&rows[0].score));
    }

    #[test]
    fn stored_emails_always_look_deliverable(email in proptest::option::of("\\PC{0,30}")) {
        let rows = sanitize_extracted(vec![ExtractedLead {
            name: Some("Ana".to_string()),
            email,
            phone: None,
            company_name: None,
            score: Some(50),
            category: None,
            source_url: None,
        }]);

        if let Some(stored) = rows.first().and_then(|r| r.email.as_deref()) {
            prop_assert!(is_deliverable_email(stored));
        }
    }
}
