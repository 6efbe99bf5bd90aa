//! Resource client against a real HTTP server

use formflow_client::{ClientConfig, ResourceClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, api_key: Option<&str>) -> ResourceClient {
    ResourceClient::new(ClientConfig {
        base_url: server.uri(),
        api_key: api_key.map(str::to_string),
        language: Some("nl".into()),
        ..Default::default()
    })
    .expect("client builds")
}

#[tokio::test]
async fn test_list_follows_next_links_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/forms/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3, "next": null, "previous": null, "results": [{"slug": "c"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/forms/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": format!("{}/api/v1/forms/?page=2", server.uri()),
            "previous": null,
            "results": [{"slug": "a"}, {"slug": "b"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let response = client.list("/api/v1/forms/", &[]).await.unwrap();

    assert!(response.ok);
    assert_eq!(response.data, json!([{"slug": "a"}, {"slug": "b"}, {"slug": "c"}]));
}

#[tokio::test]
async fn test_error_body_is_passed_through() {
    let server = MockServer::start().await;
    let error = json!({
        "type": "validation-error",
        "invalidParams": [{"name": "data.email", "code": "invalid", "reason": "Enter a valid email address."}]
    });

    Mock::given(method("POST"))
        .and(path("/api/v1/submissions/abc/steps/"))
        .and(body_json(json!({"form_step": "http://x/step", "data": {"email": "nope"}})))
        .respond_with(ResponseTemplate::new(400).set_body_json(error.clone()))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client
        .create(
            "/api/v1/submissions/abc/steps/",
            &json!({"form_step": "http://x/step", "data": {"email": "nope"}}),
        )
        .await
        .unwrap_err();

    let response = err.response().expect("server response attached");
    assert_eq!(response.status, 400);
    assert_eq!(response.data, error);
}

#[tokio::test]
async fn test_auth_and_language_headers_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/forms/private"))
        .and(header("authorization", "Token secret"))
        .and(header("accept-language", "nl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"slug": "private"})))
        .mount(&server)
        .await;

    let client = client_for(&server, Some("secret"));
    let response = client.get("/api/v1/forms/private", &[]).await.unwrap();
    assert!(response.ok);
    assert_eq!(response.data["slug"], "private");
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let client = ResourceClient::new(ClientConfig {
        base_url: "http://127.0.0.1:9".into(),
        timeout_secs: Some(2),
        ..Default::default()
    })
    .unwrap();

    let err = client.get("/api/v1/forms/", &[]).await.unwrap_err();
    assert!(err.is_transport());
}
