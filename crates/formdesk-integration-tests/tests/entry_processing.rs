//! Integration tests for entry processing
//!
//! These tests drive complete entries through the router with in-memory
//! templates and a recording transport.

mod common;

use axum::http::StatusCode;
use common::{
    body_text, create_default_app, create_test_app, entry_request, fixture_store,
    secured_config, RecordingTransport, CONSENT_STRUCTURE, HANDSHAKE_KEY, SURVEY_STRUCTURE,
};
use formdesk_core::{
    Dispatcher, EntryPipeline, HandshakeVerifier, HttpMethod, Parameters, Submission,
};
use std::sync::Arc;
use tower::ServiceExt;

fn consent_entry(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
    let mut pairs = vec![
        ("HandshakeKey", HANDSHAKE_KEY),
        ("EntryId", "9"),
        ("Field1", "yes"),
        ("FieldStructure", CONSENT_STRUCTURE),
    ];
    pairs.extend_from_slice(extra);
    pairs
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_handshake_key_is_rejected_with_400() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let pairs = [("EntryId", "9"), ("Field1", "yes"), ("FieldStructure", CONSENT_STRUCTURE)];
    let response = app
        .oneshot(entry_request("/entries/abc123", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], 400);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Handshake key is missing"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_wrong_handshake_key_is_rejected_with_403() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let pairs = [
        ("HandshakeKey", "wrong"),
        ("EntryId", "9"),
        ("Field1", "yes"),
        ("FieldStructure", CONSENT_STRUCTURE),
    ];
    let response = app
        .oneshot(entry_request("/entries/formhash42", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_unauthenticated_mode_accepts_entries_without_key() {
    let transport = RecordingTransport::new();
    let app = create_test_app(
        formdesk_api::ServiceConfig::default(),
        Arc::new(fixture_store()),
        Arc::new(transport.clone()),
    );

    let pairs = [("EntryId", "9"), ("Field1", "yes"), ("FieldStructure", CONSENT_STRUCTURE)];
    let response = app
        .oneshot(entry_request("/entries/formhash42", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.sent_names(), vec!["ticket"]);
}

// ============================================================================
// Entry Assembly and Transformation
// ============================================================================

#[tokio::test]
async fn test_entry_fields_carry_titles_from_structure() {
    let pipeline = EntryPipeline::new(
        HandshakeVerifier::new(Some(HANDSHAKE_KEY.to_string())),
        Arc::new(fixture_store()),
        Dispatcher::new(Arc::new(RecordingTransport::new())),
    );
    let params: Parameters = consent_entry(&[]).into_iter().collect();

    let output = pipeline
        .process(&Submission::new("/formhash42", params))
        .await
        .unwrap();

    let fields = output.entry.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].id(), "Field1");
    assert_eq!(fields[0].value(), "yes");
    assert_eq!(fields[0].title(), Some("Consent"));
    assert!(output.entry.field("FieldStructure").is_none());
}

#[tokio::test]
async fn test_valid_entry_renders_and_dispatches_requests() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let response = app
        .oneshot(entry_request("/entries/formhash42", &consent_entry(&[])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/xml; charset=UTF-8"
    );
    assert_eq!(response.headers()["x-dispatch-failures"], "0");

    let body = body_text(response).await;
    assert!(body.starts_with("<?xml"));
    assert!(body.contains(r#"<requests hash="formhash42" entryId="9">"#));
    assert!(body.contains(r#"name="ticket""#));
    assert!(body.contains(r#"source="webform-formhash42""#));
    assert!(body.contains(r#"<consent label="Consent">yes</consent>"#));
    assert!(
        !body.contains("<notes"),
        "optional empty element is omitted"
    );
    assert!(!body.contains(r#"name="contact""#), "guarded request is skipped");

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, HttpMethod::Post);
    assert_eq!(sent[0].path, "/api/v1/servicerequests");
    assert_eq!(sent[0].body.attribute("externalId"), Some("9"));
}

#[tokio::test]
async fn test_guarded_request_is_emitted_when_field_present() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let response = app
        .oneshot(entry_request(
            "/entries/formhash42",
            &consent_entry(&[("Field2", "jo@example.org")]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.sent_names(), vec!["ticket", "contact"]);

    let contact = &transport.sent()[1];
    assert_eq!(contact.method, HttpMethod::Put);
    assert_eq!(contact.path, "/api/v1/contacts/jo%40example.org");
    assert_eq!(
        contact.body.child("email").and_then(|e| e.text.as_deref()),
        Some("jo@example.org")
    );
}

#[tokio::test]
async fn test_fan_out_emits_one_request_per_matching_field() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let pairs = [
        ("HandshakeKey", HANDSHAKE_KEY),
        ("EntryId", "31"),
        ("QuestionField2", "42"),
        ("CommentField", "not a question"),
        ("QuestionField1", "green"),
        ("FieldStructure", SURVEY_STRUCTURE),
    ];
    let response = app
        .oneshot(entry_request("/entries/survey7", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        transport.sent_names(),
        vec!["answer:QuestionField2", "answer:QuestionField1"]
    );

    let sent = transport.sent();
    assert_eq!(sent[0].path, "/api/v1/servicerequests/31/answers");
    assert_eq!(
        sent[0].body.child("title").and_then(|e| e.text.as_deref()),
        Some("Favourite number")
    );
    assert_eq!(
        sent[1].body.child("value").and_then(|e| e.text.as_deref()),
        Some("green")
    );
}

#[tokio::test]
async fn test_unknown_form_returns_404() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let response = app
        .oneshot(entry_request("/entries/nosuchform", &consent_entry(&[])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_missing_required_field_returns_400() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let pairs = [
        ("HandshakeKey", HANDSHAKE_KEY),
        ("EntryId", "9"),
        ("FieldStructure", CONSENT_STRUCTURE),
    ];
    let response = app
        .oneshot(entry_request("/entries/formhash42", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.contains("Field1"));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_missing_field_structure_returns_400() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let pairs = [("HandshakeKey", HANDSHAKE_KEY), ("EntryId", "9"), ("Field1", "yes")];
    let response = app
        .oneshot(entry_request("/entries/formhash42", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_field_structure_returns_500() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let pairs = [
        ("HandshakeKey", HANDSHAKE_KEY),
        ("EntryId", "9"),
        ("Field1", "yes"),
        ("FieldStructure", "{not json"),
    ];
    let response = app
        .oneshot(entry_request("/entries/formhash42", &pairs))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("field structure JSON"));
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_failed_dispatch_does_not_stop_later_requests() {
    let transport = RecordingTransport::failing(&["ticket"]);
    let app = create_default_app(&transport);

    let response = app
        .oneshot(entry_request(
            "/entries/formhash42",
            &consent_entry(&[("Field2", "jo@example.org")]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-dispatch-failures"], "1");
    assert_eq!(transport.sent_names(), vec!["ticket", "contact"]);
}

#[tokio::test]
async fn test_failed_dispatch_returns_502_when_strict() {
    let transport = RecordingTransport::failing(&["contact"]);
    let mut config = secured_config();
    config.ticketing.fail_on_dispatch_error = true;
    let app = create_test_app(
        config,
        Arc::new(fixture_store()),
        Arc::new(transport.clone()),
    );

    let response = app
        .oneshot(entry_request(
            "/entries/formhash42",
            &consent_entry(&[("Field2", "jo@example.org")]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["x-dispatch-failures"], "1");
    assert!(body_text(response).await.contains("<requests"));
    assert_eq!(transport.sent_names(), vec!["ticket", "contact"]);
}

#[tokio::test]
async fn test_repeated_entries_render_identically() {
    let transport = RecordingTransport::new();
    let app = create_default_app(&transport);

    let first = app
        .clone()
        .oneshot(entry_request("/entries/formhash42", &consent_entry(&[])))
        .await
        .unwrap();
    let second = app
        .oneshot(entry_request("/entries/formhash42", &consent_entry(&[])))
        .await
        .unwrap();

    assert_eq!(body_text(first).await, body_text(second).await);
    let sent = transport.sent();
    assert_eq!(sent[0], sent[1]);
}
