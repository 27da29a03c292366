mod common;

use axum::http::StatusCode;
use common::{TestApp, body_json};
use jinet::catalog::{self, CatalogQuery};
use jinet::config::Config;
use pretty_assertions::assert_eq;

fn identifiers(page: &catalog::CatalogPage) -> Vec<String> {
    page.packages
        .iter()
        .map(|entry| entry.identifier.clone().unwrap())
        .collect()
}

#[tokio::test]
async fn only_the_latest_version_is_listed() {
    let app = TestApp::new().await;
    let (alice, _) = app.user("alice", true).await;
    let (bob, _) = app.user("bob", true).await;

    app.publish(&alice, "tool", &[]).await;
    app.publish(&alice, "tool", &[]).await;
    app.publish(&bob, "tool", &[]).await;
    app.publish(&alice, "tool", &[]).await;

    let page = catalog::list(&app.db, CatalogQuery::default(), 10)
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(identifiers(&page), vec!["bob/tool@1", "alice/tool@3"]);
}

#[tokio::test]
async fn unknown_tag_gives_an_empty_page() {
    let app = TestApp::new().await;
    let (alice, _) = app.user("alice", true).await;
    app.publish(&alice, "pca_2D", &["pca"]).await;

    let query = CatalogQuery {
        tag: Some("nothing-has-this".to_string()),
        ..CatalogQuery::default()
    };
    let page = catalog::list(&app.db, query, 10).await.unwrap();

    assert!(page.packages.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.tags, vec!["nothing-has-this".to_string()]);
    assert!(page.filtered_by_tag);
}

#[tokio::test]
async fn tag_and_term_combine() {
    let app = TestApp::new().await;
    let (alice, _) = app.user("alice", true).await;
    app.publish(&alice, "pca_2D", &["dimred", "plot"]).await;
    app.publish(&alice, "umap_2D", &["dimred"]).await;
    app.publish(&alice, "scatter", &["plot"]).await;

    let query = CatalogQuery {
        tag: Some("dimred".to_string()),
        term: Some("umap".to_string()),
        ..CatalogQuery::default()
    };
    let page = catalog::list(&app.db, query, 10).await.unwrap();
    assert_eq!(identifiers(&page), vec!["alice/umap_2D@1"]);

    let query = CatalogQuery {
        tag: Some("plot".to_string()),
        ..CatalogQuery::default()
    };
    let page = catalog::list(&app.db, query, 10).await.unwrap();
    assert_eq!(identifiers(&page), vec!["alice/pca_2D@1", "alice/scatter@1"]);
}

#[tokio::test]
async fn tag_filter_looks_at_the_latest_version() {
    let app = TestApp::new().await;
    let (alice, _) = app.user("alice", true).await;
    app.publish(&alice, "tool", &["old"]).await;
    app.publish(&alice, "tool", &["new"]).await;

    let query = CatalogQuery {
        tag: Some("old".to_string()),
        ..CatalogQuery::default()
    };
    let page = catalog::list(&app.db, query, 10).await.unwrap();
    assert_eq!(page.total, 0);

    let unfiltered = catalog::list(&app.db, CatalogQuery::default(), 10)
        .await
        .unwrap();
    assert_eq!(unfiltered.tags, vec!["new".to_string(), "old".to_string()]);
}

#[tokio::test]
async fn total_counts_every_match_not_just_the_page() {
    let app = TestApp::new().await;
    let (alice, _) = app.user("alice", true).await;
    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(app.publish(&alice, &format!("tool{n}"), &[]).await);
    }

    let page = catalog::list(&app.db, CatalogQuery::default(), 2)
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.packages.len(), 2);
    assert_eq!(page.next, Some(ids[2]));

    let query = CatalogQuery {
        since: ids[4],
        ..CatalogQuery::default()
    };
    let page = catalog::list(&app.db, query, 2).await.unwrap();
    assert_eq!(identifiers(&page), vec!["alice/tool4@1"]);
    assert_eq!(page.total, 5);
    assert_eq!(page.next, None);
}

#[tokio::test]
async fn listing_endpoint_treats_empty_term_as_no_filter() {
    let config = Config {
        page_size: 12,
        ..Config::default()
    };
    let app = TestApp::with_config(config, None).await;
    let (alice, _) = app.user("alice", true).await;
    app.publish(&alice, "tool", &[]).await;

    let response = app.get("/packages/list?term=&tag=", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["packages"][0]["identifier"], "alice/tool@1");
    assert_eq!(json["packages"][0]["name"], "tool");
    assert_eq!(json["filtered_by_tag"], false);
}
