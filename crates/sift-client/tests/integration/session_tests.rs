use sift_client::{HtmlDocument, ProxyLoader, RestPatternStore, open_session};
use sift_core::binding::Binding;
use sift_core::compose::{ComposeOptions, compose};
use sift_core::error::AppError;
use sift_core::highlight::HighlightKind;
use sift_core::resolver::{Placement, SubpatternResolver};
use sift_core::session::CrawlerSession;
use sift_core::traits::Document;
use sift_core::tree::{PatternTree, delete_pattern};

use crate::common::{TEST_TOKEN, TestServer, list_page, login_page, site, spawn_server};

async fn open(server: &TestServer) -> CrawlerSession<HtmlDocument> {
    let loader = ProxyLoader::new(&server.proxy_url()).unwrap();
    open_session(&loader, site(), list_page()).await.unwrap()
}

fn resolver(server: &TestServer) -> SubpatternResolver<RestPatternStore> {
    SubpatternResolver::new(
        RestPatternStore::new(&server.base_url)
            .unwrap()
            .with_token(TEST_TOKEN),
    )
}

#[tokio::test]
async fn proxy_receives_site_settings() {
    let server = spawn_server().await;
    let session = open(&server).await;

    assert_eq!(session.page().id, 10);
    let queries = server.backend.lock().unwrap().proxy_queries.clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["url"], "https://catalog.example/products");
    assert_eq!(queries[0]["auth_username"], "crawler");
    assert_eq!(queries[0]["cookies"], "session=abc");
    assert!(!queries[0].contains_key("proxy_password"));
}

#[tokio::test]
async fn proxy_failure_is_reported() {
    let server = spawn_server().await;
    let loader = ProxyLoader::new(&server.proxy_url()).unwrap();
    let mut page = list_page();
    page.url = "https://catalog.example/missing".into();

    let err = open_session(&loader, site(), page).await.err().unwrap();
    assert!(matches!(err, AppError::HttpError(ref m) if m.contains("404")));
}

#[tokio::test]
async fn every_element_round_trips() {
    let server = spawn_server().await;
    let session = open(&server).await;
    let doc = session.document();

    for options in [ComposeOptions::default(), ComposeOptions::default().prefer_id()] {
        for node in doc.select("*").unwrap() {
            let selector = compose(&node, options);
            assert_eq!(doc.select(&selector).unwrap(), vec![node], "{selector}");
        }
    }
}

#[tokio::test]
async fn sibling_clicks_build_generalized_rule() {
    let server = spawn_server().await;
    let mut session = open(&server).await;
    let resolver = resolver(&server);

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    assert!(tree.is_empty());
    session.hover_first("ul > li").unwrap();
    let first = session.click(&resolver, &tree, None).await.unwrap();
    let Placement::Created(root) = first else {
        panic!("expected a new top-level rule");
    };
    assert_eq!(root.selector, "html > body > div > ul > li");

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.hover_first("ul > li:nth-child(2)").unwrap();
    let second = session.click(&resolver, &tree, None).await.unwrap();
    let Placement::Reused(sub) = second else {
        panic!("expected reuse of the first rule");
    };
    assert_eq!(sub.parent_id, root.id);
    assert!(sub.created);
    assert_eq!(sub.child.selector, "");

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    assert_eq!(tree.roots().len(), 1);
    assert_eq!(tree.len(), 2);
    assert_eq!(session.hover_row(&tree, sub.child.id).unwrap(), 3);
    assert_eq!(session.highlight().unwrap().kind, HighlightKind::Row);
}

#[tokio::test]
async fn nested_field_and_idempotent_repeat() {
    let server = spawn_server().await;
    let mut session = open(&server).await;
    let resolver = resolver(&server);

    session.hover_first("ul > li").unwrap();
    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.click(&resolver, &tree, None).await.unwrap();

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    let candidate = session.hover_first("li:nth-child(3) span").unwrap().unwrap();
    assert!(candidate.is_link());
    assert_eq!(candidate.suggested_attribute(), Some("href"));
    let placement = session
        .click(&resolver, &tree, Some(Binding::mapped("Product", "name")))
        .await
        .unwrap();
    let name = placement.rule().clone();
    assert_eq!(name.selector, "a > span");
    assert_eq!(name.element_class.as_deref(), Some("name"));
    assert_eq!(name.mapped_type.as_deref(), Some("Product"));

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    assert_eq!(
        tree.effective_selector(name.id).unwrap(),
        "html > body > div > ul > li a > span"
    );
    assert_eq!(session.hover_row(&tree, name.id).unwrap(), 3);

    session.hover_first("li:nth-child(1) span").unwrap();
    let again = session.click(&resolver, &tree, None).await.unwrap();
    let Placement::Reused(sub) = again else {
        panic!("expected reuse");
    };
    assert!(!sub.created);
    assert_eq!(sub.child.id, name.id);
    assert_eq!(server.rules().len(), 2);
}

#[tokio::test]
async fn click_under_nested_row_keeps_relative_parent() {
    let server = spawn_server().await;
    let mut session = open(&server).await;
    let resolver = resolver(&server);

    session.hover_first("ul > li").unwrap();
    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    let root = session.click(&resolver, &tree, None).await.unwrap().rule().id;

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.select_row(Some(root));
    session.hover_first("li:nth-child(2) > a").unwrap();
    let link = session.click(&resolver, &tree, None).await.unwrap().rule().clone();
    assert_eq!(link.selector, "a");

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.select_row(Some(link.id));
    session.hover_first("li:nth-child(3) span").unwrap();
    let placement = session.click(&resolver, &tree, None).await.unwrap();
    let Placement::Reused(sub) = placement else {
        panic!("expected a child of the nested row");
    };
    assert_eq!(sub.parent_id, link.id);
    assert_eq!(sub.parent_selector, "a");
    assert_eq!(sub.child.selector, "span");
    assert_eq!(sub.child.element_class.as_deref(), Some("name"));

    let requests = server.requests();
    let put = requests
        .iter()
        .rposition(|r| r.starts_with(&format!("PUT /rules/{} ", link.id)))
        .unwrap();
    let post = requests.iter().rposition(|r| r.starts_with("POST")).unwrap();
    assert!(put < post, "{requests:#?}");

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    assert_eq!(tree.find(link.id).unwrap().selector, "a");
    assert_eq!(
        tree.effective_selector(sub.child.id).unwrap(),
        "html > body > div > ul > li a span"
    );
    assert_eq!(session.hover_row(&tree, sub.child.id).unwrap(), 3);
    assert_eq!(server.rules().len(), 3);
}

#[tokio::test]
async fn repeated_generalized_click_keeps_one_top_level_rule() {
    let server = spawn_server().await;
    let mut session = open(&server).await;
    let resolver = resolver(&server);

    session.hover_first("li:nth-child(1) > em").unwrap();
    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    let first = session.click(&resolver, &tree, None).await.unwrap();
    let Placement::Created(rule) = first else {
        panic!("expected a new top-level rule");
    };
    assert_eq!(rule.selector, "html > body > div > ul > li > em");

    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.hover_first("li:nth-child(3) > em").unwrap();
    let again = session.click(&resolver, &tree, None).await.unwrap();
    assert!(matches!(again, Placement::Existing(ref existing) if existing.id == rule.id));
    assert_eq!(server.rules().len(), 1);
}

#[tokio::test]
async fn parent_update_precedes_child_create() {
    let server = spawn_server().await;
    let mut session = open(&server).await;
    let resolver = resolver(&server);

    session.hover_first("ul > li").unwrap();
    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.click(&resolver, &tree, None).await.unwrap();
    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    session.hover_first("li:nth-child(2) > em").unwrap();
    session.click(&resolver, &tree, None).await.unwrap();

    let requests = server.requests();
    let put = requests.iter().rposition(|r| r.starts_with("PUT")).unwrap();
    let post = requests.iter().rposition(|r| r.starts_with("POST")).unwrap();
    assert!(put < post, "{requests:#?}");
    assert_eq!(requests[post], "POST /rules em");
}

#[tokio::test]
async fn delete_removes_subtree_children_first() {
    let server = spawn_server().await;
    let mut session = open(&server).await;
    let resolver = resolver(&server);

    session.hover_first("ul > li").unwrap();
    let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    let root = session.click(&resolver, &tree, None).await.unwrap().rule().id;
    for locator in ["li:nth-child(2) span", "li:nth-child(2) > em"] {
        let tree = PatternTree::load(resolver.store(), 10).await.unwrap();
        session.hover_first(locator).unwrap();
        session.click(&resolver, &tree, None).await.unwrap();
    }

    let mut tree = PatternTree::load(resolver.store(), 10).await.unwrap();
    assert_eq!(tree.len(), 3);
    let removed = delete_pattern(resolver.store(), &mut tree, root).await.unwrap();

    assert_eq!(removed.len(), 3);
    assert_eq!(removed.last(), Some(&root));
    assert!(tree.is_empty());
    assert!(server.rules().is_empty());
}

#[tokio::test]
async fn login_page_rules_hold_input_values() {
    let server = spawn_server().await;
    let loader = ProxyLoader::new(&server.proxy_url()).unwrap();
    let mut session = open_session(&loader, site(), login_page()).await.unwrap();
    let resolver = resolver(&server);
    let tree = PatternTree::load(resolver.store(), 11).await.unwrap();

    session.hover_first("input[name=user]").unwrap();
    let err = session
        .click(&resolver, &tree, Some(Binding::mapped("User", "login")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Binding(_)));

    let placement = session
        .click(&resolver, &tree, Some(Binding::input("crawler")))
        .await
        .unwrap();
    let rule = placement.rule();
    assert_eq!(rule.selector, "html > body > form > input");
    assert_eq!(rule.input_value.as_deref(), Some("crawler"));
    assert!(rule.mapped_type.is_none());
    assert!(rule.mapped_attribute.is_none());
}
