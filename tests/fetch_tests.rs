//! Integration tests for the fetch client
//!
//! These tests use wiremock to check retry counts, status handling and
//! body decoding against real HTTP exchanges.

mod common;

use tidewatch::config::HttpConfig;
use tidewatch::{FetchClient, FetchOptions, TidewatchError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_always_503_makes_exactly_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let response = common::client()
        .get(&format!("{}/down", server.uri()), FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status_code, 503);
    server.verify().await;
}

#[tokio::test]
async fn test_status_500_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let response = common::client()
        .get(&format!("{}/broken", server.uri()), FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status_code, 500);
    server.verify().await;
}

#[tokio::test]
async fn test_retry_count_is_configurable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(5)
        .mount(&server)
        .await;

    let options = FetchOptions::default().with_retry_count(5);
    let response = common::client().get(&server.uri(), options).await.unwrap();

    assert_eq!(response.status_code, 502);
    server.verify().await;
}

#[tokio::test]
async fn test_get_html_parses_only_200() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(common::html("<h1>Mazda 3</h1>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<h1>Not found</h1>"))
        .mount(&server)
        .await;

    let client = common::client();
    let ok = client
        .get_html(&format!("{}/ok", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    let page = ok.page.unwrap();
    assert_eq!(
        page.parse().select_text("h1").unwrap().as_deref(),
        Some("Mazda 3")
    );
    assert_eq!(page.url().path(), "/ok");

    let missing = client
        .get_html(&format!("{}/missing", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(missing.status_code, 404);
    assert!(missing.page.is_none());
    assert_eq!(missing.body, "<h1>Not found</h1>");
}

#[tokio::test]
async fn test_get_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/filters"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"available_filters": []}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = common::client();
    let response = client
        .get_json(&format!("{}/filters", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(
        response.data,
        Some(serde_json::json!({"available_filters": []}))
    );

    let gone = client
        .get_json(&format!("{}/gone", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(gone.status_code, 404);
    assert!(gone.data.is_none());
}

#[tokio::test]
async fn test_malformed_json_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let error = common::client()
        .get_json(&server.uri(), FetchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, TidewatchError::JsonParse { .. }));
    assert!(error.is_protocol());
    assert!(!error.is_transport());
}

#[tokio::test]
async fn test_connection_refused_is_a_transport_error() {
    // Bind then drop a listener so the port is known to be closed
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let error = common::client()
        .get(&format!("http://127.0.0.1:{}/", port), FetchOptions::default())
        .await
        .unwrap_err();

    assert!(error.is_transport());
}

#[tokio::test]
async fn test_user_agent_selection() {
    let config = HttpConfig {
        desktop_user_agent: "DesktopAgent/1.0".to_string(),
        mobile_user_agent: "MobileAgent/1.0".to_string(),
        ..HttpConfig::default()
    };
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "MobileAgent/1.0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("user-agent", "DesktopAgent/1.0"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = FetchClient::new(&config).unwrap();
    let mobile = client
        .get(&server.uri(), FetchOptions::default().mobile().skip_proxy())
        .await
        .unwrap();
    let desktop = client
        .get(&server.uri(), FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(mobile.status_code, 200);
    assert_eq!(desktop.status_code, 204);
    server.verify().await;
}

#[tokio::test]
async fn test_get_bytes_keeps_binary_body() {
    let server = MockServer::start().await;
    let jpeg = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
    Mock::given(method("GET"))
        .and(path("/photos/1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(jpeg.clone()))
        .mount(&server)
        .await;

    let client = common::client();
    let response = client
        .get_bytes(&format!("{}/photos/1.jpg", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, jpeg);

    let missing = client
        .get_bytes(&format!("{}/photos/2.jpg", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(missing.status_code, 404);
}
