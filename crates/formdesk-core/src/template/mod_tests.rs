//! Tests for template compilation and transformation.

use super::*;
use crate::entry::EntryField;
use crate::EntryId;

const CONSENT_TEMPLATE: &str = r#"
description: Consent form
requests:
  - name: ticket
    path: /api/v1/sr
    body:
      name: ServiceRequest
      attributes:
        source: "webform-{{entry.hash}}"
      children:
        - name: title
          value: "Entry {{entry.id}}: {{Field1.title}}"
        - name: answer
          value: "{{Field1}}"
        - name: notes
          value: "{{Field9?}}"
          omit_empty: true
"#;

fn entry(fields: Vec<EntryField>) -> Entry {
    Entry::new(
        FormHash::new("formhash42").expect("hash"),
        EntryId::new("9"),
        fields,
    )
}

fn consent_entry() -> Entry {
    entry(vec![EntryField::new(
        "Field1",
        "yes",
        Some("Consent".to_string()),
    )])
}

// ============================================================================
// Compilation
// ============================================================================

mod parse {
    use super::*;

    #[test]
    fn test_valid_template_compiles() {
        let template = Template::parse(CONSENT_TEMPLATE).expect("parse");

        assert_eq!(template.description(), Some("Consent form"));
        assert_eq!(template.request_names().collect::<Vec<_>>(), vec!["ticket"]);
        assert_eq!(template.len(), 1);
    }

    #[test]
    fn test_invalid_yaml_is_malformed() {
        let result = Template::parse("requests: [unclosed");
        assert!(matches!(result, Err(TemplateError::Malformed { .. })));
    }

    #[test]
    fn test_unknown_keys_are_malformed() {
        let source = r#"
requests:
  - name: ticket
    path: /sr
    target: elsewhere
    body: { name: SR }
"#;
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_duplicate_request_names_are_malformed() {
        let source = r#"
requests:
  - { name: ticket, path: /a, body: { name: A } }
  - { name: ticket, path: /b, body: { name: B } }
"#;
        match Template::parse(source) {
            Err(TemplateError::Malformed { message }) => assert!(message.contains("ticket")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_element_name_is_malformed() {
        let source = "requests:\n  - { name: t, path: /a, body: { name: \"bad name\" } }\n";
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_invalid_attribute_name_is_malformed() {
        let source = r#"
requests:
  - name: t
    path: /a
    body: { name: A, attributes: { "1st": x } }
"#;
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_relative_or_host_paths_are_malformed() {
        for path in ["api/sr", "//evil.example/sr", "http://evil.example/sr"] {
            let source =
                format!("requests:\n  - {{ name: t, path: \"{path}\", body: {{ name: A }} }}\n");
            assert!(
                matches!(
                    Template::parse(&source),
                    Err(TemplateError::Malformed { .. })
                ),
                "path {path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_bad_placeholder_is_malformed() {
        let source = r#"
requests:
  - { name: t, path: /a, body: { name: A, value: "{{ entry.nope }}" } }
"#;
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_current_field_outside_for_each_is_malformed() {
        let source = r#"
requests:
  - { name: t, path: /a, body: { name: A, value: "{{field.value}}" } }
"#;
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_bad_for_each_pattern_is_malformed() {
        let source = r#"
requests:
  - name: t
    path: /a
    for_each: { pattern: "(" }
    body: { name: A }
"#;
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unsupported_method_is_malformed() {
        let source = "requests:\n  - { name: t, method: DELETE, path: /a, body: { name: A } }\n";
        assert!(matches!(
            Template::parse(source),
            Err(TemplateError::Malformed { .. })
        ));
    }
}

// ============================================================================
// Transformation
// ============================================================================

mod transform {
    use super::*;

    #[test]
    fn test_consent_entry_produces_ticket() {
        let template = Template::parse(CONSENT_TEMPLATE).expect("parse");

        let documents = template.transform(&consent_entry()).expect("transform");

        assert_eq!(documents.len(), 1);
        let ticket = &documents[0];
        assert_eq!(ticket.name, "ticket");
        assert_eq!(ticket.method, HttpMethod::Post);
        assert_eq!(ticket.path, "/api/v1/sr");
        assert_eq!(ticket.body.name, "ServiceRequest");
        assert_eq!(ticket.body.attribute("source"), Some("webform-formhash42"));
        assert_eq!(
            ticket.body.child("title").and_then(|c| c.text.as_deref()),
            Some("Entry 9: Consent")
        );
        assert_eq!(
            ticket.body.child("answer").and_then(|c| c.text.as_deref()),
            Some("yes")
        );
        assert!(ticket.body.child("notes").is_none());
    }

    #[test]
    fn test_optional_value_is_kept_when_present() {
        let template = Template::parse(CONSENT_TEMPLATE).expect("parse");
        let entry = entry(vec![
            EntryField::new("Field1", "yes", Some("Consent".to_string())),
            EntryField::new("Field9", "call me", None),
        ]);

        let documents = template.transform(&entry).expect("transform");

        assert_eq!(
            documents[0]
                .body
                .child("notes")
                .and_then(|c| c.text.as_deref()),
            Some("call me")
        );
    }

    #[test]
    fn test_missing_required_field_fails() {
        let template = Template::parse(CONSENT_TEMPLATE).expect("parse");

        let result = template.transform(&entry(vec![]));

        assert_eq!(
            result,
            Err(TransformError::MissingField {
                request: "ticket".to_string(),
                field: "Field1".to_string(),
            })
        );
    }

    #[test]
    fn test_transform_is_deterministic() {
        let template = Template::parse(CONSENT_TEMPLATE).expect("parse");
        let entry = consent_entry();

        assert_eq!(
            template.transform(&entry).expect("first"),
            template.transform(&entry).expect("second")
        );
    }

    #[test]
    fn test_requests_are_emitted_in_declaration_order() {
        let source = r#"
requests:
  - { name: ticket, path: /sr, body: { name: SR } }
  - { name: contact, method: PUT, path: /contacts, body: { name: Contact } }
"#;
        let template = Template::parse(source).expect("parse");

        let documents = template.transform(&consent_entry()).expect("transform");

        let names: Vec<&str> = documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ticket", "contact"]);
        assert_eq!(documents[1].method, HttpMethod::Put);
    }

    #[test]
    fn test_when_guard_skips_absent_or_empty_field() {
        let source = r#"
requests:
  - { name: ticket, path: /sr, body: { name: SR } }
  - { name: callback, when: Field5, path: /callbacks, body: { name: Callback, value: "{{Field5}}" } }
"#;
        let template = Template::parse(source).expect("parse");

        let without = template.transform(&consent_entry()).expect("transform");
        let empty = template
            .transform(&entry(vec![EntryField::new("Field5", "", None)]))
            .expect("transform");
        let with = template
            .transform(&entry(vec![EntryField::new("Field5", "555-0100", None)]))
            .expect("transform");

        assert_eq!(without.len(), 1);
        assert_eq!(empty.len(), 1);
        assert_eq!(with.len(), 2);
        assert_eq!(with[1].body.text.as_deref(), Some("555-0100"));
    }

    #[test]
    fn test_for_each_fans_out_in_entry_order() {
        let source = r#"
requests:
  - name: attachment
    path: "/sr/{{entry.id}}/attachments/{{field.id}}"
    for_each: { pattern: "^Field2\\d+$" }
    body:
      name: Attachment
      attributes: { label: "{{field.title}}" }
      value: "{{field.value}}"
"#;
        let template = Template::parse(source).expect("parse");
        let entry = entry(vec![
            EntryField::new("Field22", "b.pdf", Some("Second".to_string())),
            EntryField::new("Field1", "yes", None),
            EntryField::new("Field21", "a.pdf", None),
        ]);

        let documents = template.transform(&entry).expect("transform");

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].name, "attachment:Field22");
        assert_eq!(documents[0].path, "/sr/9/attachments/Field22");
        assert_eq!(documents[0].body.attribute("label"), Some("Second"));
        assert_eq!(documents[1].body.attribute("label"), Some("Field21"));
        assert_eq!(documents[1].body.text.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn test_for_each_without_matches_emits_nothing() {
        let source = r#"
requests:
  - { name: a, path: /a, for_each: { pattern: "^Upload" }, body: { name: A } }
"#;
        let template = Template::parse(source).expect("parse");

        assert!(template
            .transform(&consent_entry())
            .expect("transform")
            .is_empty());
    }

    #[test]
    fn test_path_values_are_percent_encoded() {
        let source = "requests:\n  - { name: t, path: \"/sr/{{Field1}}\", body: { name: A } }\n";
        let template = Template::parse(source).expect("parse");
        let entry = entry(vec![EntryField::new("Field1", "a b/../c", None)]);

        let documents = template.transform(&entry).expect("transform");

        assert_eq!(documents[0].path, "/sr/a%20b%2F..%2Fc");
    }

    #[test]
    fn test_unrepresentable_value_is_invalid_output() {
        let template = Template::parse(CONSENT_TEMPLATE).expect("parse");
        let entry = entry(vec![EntryField::new("Field1", "nul\u{0}", None)]);

        let result = template.transform(&entry);

        assert!(matches!(result, Err(TransformError::InvalidOutput { .. })));
    }

    #[test]
    fn test_omitted_children_cascade() {
        let source = r#"
requests:
  - name: t
    path: /a
    body:
      name: A
      children:
        - name: contact
          omit_empty: true
          children:
            - { name: phone, value: "{{Field7?}}", omit_empty: true }
"#;
        let template = Template::parse(source).expect("parse");

        let documents = template.transform(&consent_entry()).expect("transform");

        assert!(documents[0].body.children.is_empty());
    }

    #[test]
    fn test_empty_root_keeps_its_attributes() {
        let source = r#"
requests:
  - name: t
    path: /a
    body:
      name: ServiceRequest
      attributes: { source: "webform-{{entry.hash}}" }
      omit_empty: true
"#;
        let template = Template::parse(source).expect("parse");
        let entry = Entry::new(
            FormHash::new("h").expect("hash"),
            EntryId::new("1"),
            Vec::new(),
        );

        let documents = template.transform(&entry).expect("transform");

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].body.name, "ServiceRequest");
        assert_eq!(documents[0].body.attribute("source"), Some("webform-h"));
    }
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_load_template_fetches_and_compiles() {
    let store = InMemoryTemplateStore::new().with_template("formhash42", CONSENT_TEMPLATE);

    let template = load_template(&store, &FormHash::new("formhash42").expect("hash"))
        .await
        .expect("load");

    assert_eq!(template.len(), 1);
}

#[tokio::test]
async fn test_load_template_propagates_store_errors() {
    let store = InMemoryTemplateStore::new();

    let result = load_template(&store, &FormHash::new("missing").expect("hash")).await;

    assert!(matches!(result, Err(TemplateError::NotFound { .. })));
}

#[tokio::test]
async fn test_load_template_reports_malformed_source() {
    let store = InMemoryTemplateStore::new().with_template("bad", "requests: 5");

    let result = load_template(&store, &FormHash::new("bad").expect("hash")).await;

    assert!(matches!(result, Err(TemplateError::Malformed { .. })));
}
