use sift_client::RestPatternStore;
use sift_core::error::AppError;
use sift_core::models::NewPattern;
use sift_core::traits::{ExtractionTrigger, PatternStore};

use crate::common::{TEST_TOKEN, spawn_server};

fn store(base_url: &str) -> RestPatternStore {
    RestPatternStore::new(base_url).unwrap().with_token(TEST_TOKEN)
}

#[tokio::test]
async fn create_and_list_by_page_and_parent() {
    let server = spawn_server().await;
    let store = store(&server.base_url);

    let parent = store
        .create(&NewPattern::top_level(10, "html > body > ul > li"))
        .await
        .unwrap();
    let child = store
        .create(&NewPattern {
            mapped_type: Some("Product".into()),
            mapped_attribute: Some("name".into()),
            ..NewPattern::child_of(parent.id, "a > span")
        })
        .await
        .unwrap();

    assert_eq!(parent.source_page, Some(10));
    assert_eq!(child.parent_pattern, Some(parent.id));
    assert_eq!(child.mapped_attribute.as_deref(), Some("name"));

    let top = store.list_for_page(10).await.unwrap();
    assert_eq!(top, vec![parent.clone()]);
    let children = store.list_children(parent.id).await.unwrap();
    assert_eq!(children, vec![child]);
    assert!(store.list_for_page(99).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_selector_is_persisted() {
    let server = spawn_server().await;
    let rule = server.seed(NewPattern::top_level(10, "ul > li:nth-child(2)"));
    let store = store(&server.base_url);

    store.update_selector(rule.id, "ul > li").await.unwrap();

    assert_eq!(server.rules()[0].selector, "ul > li");
}

#[tokio::test]
async fn missing_rule_relays_status_and_message() {
    let server = spawn_server().await;
    let store = store(&server.base_url);

    let err = store.update_selector(99, "div").await.unwrap_err();
    match err {
        AppError::StoreError {
            status_code,
            message,
        } => {
            assert_eq!(status_code, 404);
            assert_eq!(message, "rule 99 not found");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = store.delete(99).await.unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}

#[tokio::test]
async fn token_is_required() {
    let server = spawn_server().await;
    let anonymous = RestPatternStore::new(&server.base_url).unwrap();

    let err = anonymous.list_for_page(10).await.unwrap_err();
    assert_eq!(err.status_code(), Some(401));
    assert!(err.to_string().contains("unauthorized"));
}

#[tokio::test]
async fn delete_removes_rule() {
    let server = spawn_server().await;
    let rule = server.seed(NewPattern::top_level(10, "table"));
    let store = store(&server.base_url);

    store.delete(rule.id).await.unwrap();

    assert!(server.rules().is_empty());
}

#[tokio::test]
async fn extract_relays_success_body() {
    let server = spawn_server().await;
    let rule = server.seed(NewPattern {
        mapped_type: Some("Product".into()),
        mapped_attribute: Some("price".into()),
        ..NewPattern::top_level(10, "em")
    });
    let store = store(&server.base_url);

    let report = store.extract(rule.id).await.unwrap();

    assert_eq!(report.rule_id, rule.id);
    assert_eq!(report.status_code, 200);
    assert_eq!(report.message.as_deref(), Some("extracted 3 values"));
}

#[tokio::test]
async fn extract_relays_validation_failure() {
    let server = spawn_server().await;
    let rule = server.seed(NewPattern::top_level(10, "em"));
    let store = store(&server.base_url);

    let err = store.extract(rule.id).await.unwrap_err();

    match err {
        AppError::ExtractionFailed {
            status_code,
            message,
        } => {
            assert_eq!(status_code, 422);
            assert_eq!(message, "rule has no mapping");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unreachable_store_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = store(&format!("http://{addr}"));
    let err = store.list_for_page(1).await.unwrap_err();

    assert!(matches!(err, AppError::NetworkError(_)), "got {err:?}");
}
