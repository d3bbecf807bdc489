use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use xkbot::db::{CourseStore, MemoryStorage};
use xkbot::events::EventBus;
use xkbot::models::CourseType;
use xkbot::portal::{Endpoints, XkClient, XkHttpClient, resolve_base_url};
use xkbot::services::{EngineSettings, FallbackResolver, RegistrationEngine};

fn client(cookie: Option<&str>) -> Arc<XkHttpClient> {
    Arc::new(XkHttpClient::new(cookie, Duration::from_secs(5)).expect("Failed to create client"))
}

#[tokio::test]
async fn test_requests_carry_ajax_header_and_cookie() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/xsxk/xkOper")
        .match_query(Matcher::Any)
        .match_header("x-requested-with", "XMLHttpRequest")
        .match_header("cookie", "JSESSIONID=abc123")
        .with_status(200)
        .with_body(r#"{"success":false}"#)
        .create_async()
        .await;

    let base = resolve_base_url(&server.host_with_port(), "https:");
    let reply = client(Some("JSESSIONID=abc123"))
        .get(&format!("{}/xkOper?method=tjxkOper&jxbid=X1", base))
        .await
        .expect("request failed");

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, r#"{"success":false}"#);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_ok_status_is_returned_not_raised() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/xsxk/xkOper")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("选课人数已满")
        .create_async()
        .await;

    let base = resolve_base_url(&server.host_with_port(), "https:");
    let reply = client(None)
        .get(&format!("{}/xkOper?method=bfakOper&jxbid=X1", base))
        .await
        .expect("request failed");

    assert_eq!(reply.status, 503);
    assert!(!reply.is_success());
    assert!(reply.body.contains("已满"));
}

#[tokio::test]
async fn test_transport_failure_is_an_error() {
    let reply = client(None)
        .get("http://127.0.0.1:1/xsxk/xkOper?method=tjxkOper&jxbid=X1")
        .await;
    assert!(reply.is_err());
}

#[test]
fn test_invalid_cookie_is_rejected() {
    assert!(XkHttpClient::new(Some("bad\ncookie"), Duration::from_secs(1)).is_err());
}

#[tokio::test]
async fn test_resolver_reads_fallback_classes() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/xsxk/loadData")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("method".into(), "getFallbackClass".into()),
            Matcher::UrlEncoded("id".into(), "CS201".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"sectionId":"S1","kcmc":"Lab"},{"sectionId":""},{"sectionId":"S2"}]"#)
        .create_async()
        .await;

    let resolver = FallbackResolver::new(
        client(None),
        Endpoints::new(resolve_base_url(&server.host_with_port(), "https:")),
    );
    assert_eq!(resolver.fetch_fallback_classes("CS201").await, vec!["S1", "S2"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_engine_registers_against_http_portal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/xsxk/loadData")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"sectionId":"S1"},{"sectionId":"S2"}]"#)
        .create_async()
        .await;
    let refused = server
        .mock("GET", "/xsxk/xkOper")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("method".into(), "tjxkOper".into()),
            Matcher::UrlEncoded("jxbid".into(), "CS201".into()),
            Matcher::UrlEncoded("glJxbid".into(), "S1".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"success":false,"message":"该实验班已满"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/xsxk/xkOper")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("method".into(), "tjxkOper".into()),
            Matcher::UrlEncoded("jxbid".into(), "CS201".into()),
            Matcher::UrlEncoded("glJxbid".into(), "S2".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"success":true,"message":"选课成功","timestamp":"12:00:01"}"#)
        .expect(1)
        .create_async()
        .await;

    let events = EventBus::new();
    let mut rx = events.subscribe();
    let settings = EngineSettings::new(resolve_base_url(&server.host_with_port(), "https:"));
    let engine = RegistrationEngine::new(
        settings,
        client(Some("JSESSIONID=abc123")),
        CourseStore::new(Arc::new(MemoryStorage::new())),
        events,
    );

    engine.add_course("CS201", CourseType::Tjxk).await.unwrap();
    engine.resolve_fallback_classes().await;
    engine.poll_once().await;
    engine.poll_once().await;
    engine.poll_once().await;

    refused.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(engine.get_status().await.success_count, 1);

    let mut succeeded = 0;
    while let Ok(event) = rx.try_recv() {
        if event.name() == "course.succeeded" {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 1);
}
