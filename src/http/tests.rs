use super::*;
use crate::mqtt::PublishError;
use crate::relay::tests::RecordingPublisher;
use crate::relay::RelayPolicy;
use crate::validation::{MessagePolicy, TopicPolicy};
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request};
use tower::ServiceExt;

fn app_with(publisher: RecordingPublisher, whitelist: &[&str], prefix: &str) -> Router {
    let policy = RelayPolicy {
        topics: TopicPolicy {
            whitelist: whitelist.iter().map(|t| t.to_string()).collect(),
            prefix: prefix.to_string(),
        },
        messages: MessagePolicy::default(),
    };
    router(RelayHandler::new(policy, publisher))
}

async fn get_path(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn publishes_decoded_topic_and_message() {
    let publisher = RecordingPublisher::default();
    let app = app_with(publisher.clone(), &[], "");

    let (status, body) = get_path(app, "/source%2Ftopic/my%20message").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(
        publisher.published(),
        vec![("source/topic".to_string(), "my message".to_string())]
    );
}

#[tokio::test]
async fn query_string_is_ignored() {
    let publisher = RecordingPublisher::default();
    let app = app_with(publisher.clone(), &["vpn"], "home/");

    let (status, _) = get_path(app, "/vpn/connected?source=router").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        publisher.published(),
        vec![("home/vpn".to_string(), "connected".to_string())]
    );
}

#[tokio::test]
async fn rejected_topic_is_bad_request() {
    let publisher = RecordingPublisher::default();
    let app = app_with(publisher.clone(), &["alerts"], "");

    let (status, body) = get_path(app, "/other/hello").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("ERROR"));
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn malformed_paths_are_bad_request() {
    let publisher = RecordingPublisher::default();
    for uri in ["/", "/alerts", "/alerts/door/open"] {
        let app = app_with(publisher.clone(), &[], "");
        let (status, body) = get_path(app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri {}", uri);
        assert_eq!(body, "ERROR: malformed path");
    }
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn broker_unavailable_is_bad_gateway() {
    let publisher = RecordingPublisher::failing(PublishError::BrokerUnavailable);
    let app = app_with(publisher, &[], "");

    let (status, _) = get_path(app, "/alerts/door%20open").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn only_get_is_served() {
    let publisher = RecordingPublisher::default();
    let app = app_with(publisher.clone(), &[], "");

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/alerts/door")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn head_is_refused_without_publishing() {
    let publisher = RecordingPublisher::default();
    let app = app_with(publisher.clone(), &[], "");

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::HEAD)
                .uri("/alerts/door")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get(axum::http::header::ALLOW).unwrap(),
        "GET"
    );
    assert!(publisher.published().is_empty());
}
