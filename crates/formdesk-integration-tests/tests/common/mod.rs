//! Common test utilities for formdesk integration tests
//!
//! This module provides:
//! - Recording and failing ticket transports
//! - Router builders over in-memory or filesystem template stores
//! - Shared form fixtures (field structures, templates, request bodies)

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use formdesk_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use formdesk_core::{
    DispatchAck, DispatchError, Dispatcher, EntryPipeline, HandshakeVerifier,
    InMemoryTemplateStore, RequestDocument, TemplateStore, TicketTransport,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const HANDSHAKE_KEY: &str = "abc123";

/// Field structure labelling `Field1` as "Consent".
pub const CONSENT_STRUCTURE: &str = r#"{
    "Fields": [
        {"ID": "Field1", "Title": "Consent"},
        {"ID": "Field2", "Title": "Email"}
    ]
}"#;

/// Template for `formhash42`: one ticket plus an optional contact update.
pub const CONSENT_TEMPLATE: &str = r#"
description: Consent form
requests:
  - name: ticket
    method: POST
    path: /api/v1/servicerequests
    body:
      name: ServiceRequest
      attributes:
        source: "webform-{{entry.hash}}"
        externalId: "{{entry.id}}"
      children:
        - name: consent
          attributes: { label: "{{Field1.title}}" }
          value: "{{Field1}}"
        - name: notes
          value: "{{Field9?}}"
          omit_empty: true
  - name: contact
    method: PUT
    path: "/api/v1/contacts/{{Field2}}"
    when: Field2
    body:
      name: Contact
      children:
        - { name: email, value: "{{Field2}}" }
"#;

/// Template emitting one answer per `QuestionField<n>` field.
pub const SURVEY_TEMPLATE: &str = r#"
requests:
  - name: answer
    path: "/api/v1/servicerequests/{{entry.id}}/answers"
    for_each:
      pattern: "^QuestionField[0-9]+$"
    body:
      name: Answer
      attributes: { question: "{{field.id}}" }
      children:
        - { name: title, value: "{{field.title}}" }
        - { name: value, value: "{{field.value}}" }
"#;

pub const SURVEY_STRUCTURE: &str = r#"[
    {"ID": "Group1", "Title": "Questions", "SubFields": [
        {"ID": "QuestionField1", "Label": "Favourite colour"},
        {"ID": "QuestionField2", "Label": "Favourite number"}
    ]}
]"#;

// ============================================================================
// Ticket Transports
// ============================================================================

/// Transport that records every request and optionally fails some by name.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<RequestDocument>>>,
    failing: Arc<HashSet<String>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request whose name is listed
    pub fn failing(names: &[&str]) -> Self {
        Self {
            sent: Arc::default(),
            failing: Arc::new(names.iter().map(|n| n.to_string()).collect()),
        }
    }

    pub fn sent(&self) -> Vec<RequestDocument> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_names(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.name).collect()
    }
}

#[async_trait]
impl TicketTransport for RecordingTransport {
    async fn send(&self, request: &RequestDocument) -> Result<DispatchAck, DispatchError> {
        self.sent.lock().unwrap().push(request.clone());

        if self.failing.contains(&request.name) {
            return Err(DispatchError::Rejected {
                status: 503,
                body: "ticketing unavailable".to_string(),
            });
        }
        Ok(DispatchAck {
            status: 201,
            body: String::new(),
        })
    }
}

// ============================================================================
// Application Builders
// ============================================================================

/// Configuration with the shared handshake key set
#[allow(dead_code)]
pub fn secured_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.handshake_key = Some(HANDSHAKE_KEY.to_string());
    config
}

/// In-memory store holding the consent and survey templates
#[allow(dead_code)]
pub fn fixture_store() -> InMemoryTemplateStore {
    InMemoryTemplateStore::new()
        .with_template("formhash42", CONSENT_TEMPLATE)
        .with_template("survey7", SURVEY_TEMPLATE)
}

/// Build a router over the given collaborators
pub fn create_test_app(
    config: ServiceConfig,
    store: Arc<dyn TemplateStore>,
    transport: Arc<dyn TicketTransport>,
) -> Router {
    let pipeline = EntryPipeline::new(
        HandshakeVerifier::new(config.webhook.handshake_key.clone()),
        store,
        Dispatcher::new(transport),
    );
    let metrics = ServiceMetrics::new().expect("metrics registry");
    create_router(AppState::new(config, Arc::new(pipeline), metrics))
}

/// Build a secured router over the fixture store and a recording transport
#[allow(dead_code)]
pub fn create_default_app(transport: &RecordingTransport) -> Router {
    create_test_app(
        secured_config(),
        Arc::new(fixture_store()),
        Arc::new(transport.clone()),
    )
}

// ============================================================================
// Request Helpers
// ============================================================================

/// Encode name/value pairs as a form body
pub fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build a form-encoded POST request
pub fn entry_request(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form_body(pairs)))
        .unwrap()
}

/// Read a response body as UTF-8 text
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
