//! Integration tests for `HyperTransport` and synthesized methods using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert2::{check, let_assert};
use serde_json::{Value, json};
use tether::middleware::{BearerAuth, Retry};
use tether::{
    ApiClient, ClientConfig, Error, HyperTransport, INVALID_REQUEST, MethodOptions, Request, Step,
    Transport, TransportConfig,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string_contains, header, method, path, query_param},
};

fn client_for(server: &MockServer) -> ApiClient<HyperTransport> {
    ApiClient::with_config(ClientConfig::builder().base_url(server.uri()).build())
}

fn first_arg(req: &mut Request, args: &[Value], name: &str) {
    req.set_url_param(name, args.first().cloned().unwrap_or_default());
}

#[tokio::test]
async fn test_get_with_pattern_and_base_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 7, "name": "Alice"}))
                .insert_header("x-request-id", "abc"),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let users = client
        .service_builder("users")
        .method(
            "load",
            MethodOptions::new()
                .verb("GET")
                .pattern("/users/:id")
                .args(|req, args| first_arg(req, args, "id")),
        )
        .build()
        .expect("service");

    let response = users.call("load", &[json!(7)]).await.expect("response");

    check!(response["status"] == 200);
    check!(response["statusText"] == "OK");
    check!(response["data"] == json!({"id": 7, "name": "Alice"}));
    check!(response["headers"]["x-request-id"] == "abc");
}

#[tokio::test]
async fn test_post_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({"name": "Bob"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42, "name": "Bob"})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let users = client
        .service_builder("users")
        .method(
            "create",
            MethodOptions::new()
                .verb("POST")
                .url("/users")
                .args(|req, args| {
                    req.insert("data", args.first().cloned().unwrap_or_default());
                }),
        )
        .build()
        .expect("service");

    let response = users
        .call("create", &[json!({"name": "Bob"})])
        .await
        .expect("response");

    check!(response["status"] == 201);
    check!(response["data"]["id"] == 42);
}

#[tokio::test]
async fn test_form_body_and_transform_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/session"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("user=alice"))
        .and(body_string_contains("remember=true"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let session = client
        .service_builder("session")
        .method(
            "open",
            MethodOptions::new()
                .verb("PUT")
                .url("/session")
                .config(json!({
                    "headers": {"Content-Type": "application/x-www-form-urlencoded"}
                }))
                .args(|req, args| {
                    req.insert("data", json!({"user": args.first().cloned().unwrap_or_default()}));
                    req.set_transform_request(|mut data| {
                        data["remember"] = json!("true");
                        data
                    });
                }),
        )
        .build()
        .expect("service");

    let response = session.call("open", &[json!("alice")]).await.expect("response");

    check!(response["status"] == 204);
    check!(response["data"] == Value::Null);
}

#[tokio::test]
async fn test_query_params_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(query_param("page", "2"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain text"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let search = client
        .service_builder("search")
        .method(
            "find",
            MethodOptions::new()
                .verb("GET")
                .url("search")
                .config(json!({"headers": {"Accept": "application/json"}}))
                .args(|req, args| {
                    req.insert(
                        "params",
                        json!({"q": args.first().cloned().unwrap_or_default(), "page": 2}),
                    );
                }),
        )
        .build()
        .expect("service");

    let response = search.call("find", &[json!("rust")]).await.expect("response");

    check!(response["status"] == 200);
    check!(response["data"] == "plain text");
}

#[tokio::test]
async fn test_non_success_status_rejects_with_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client
        .execute(TransportConfig::new(tether::Method::GET, "/missing"))
        .await;

    let_assert!(Err(error) = result);
    check!(error["status"] == 404);
    check!(error["statusText"] == "Not Found");
    check!(error["data"]["message"] == "not found");
}

#[tokio::test]
async fn test_connection_failure_has_status_zero() {
    let transport = HyperTransport::new();
    let result = transport
        .execute(TransportConfig::new(tether::Method::GET, "http://127.0.0.1:1/"))
        .await;

    let_assert!(Err(error) = result);
    check!(error["status"] == 0);
    check!(error["data"] == Value::Null);
}

#[tokio::test]
async fn test_timeout_has_status_minus_one() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let slow = client
        .service_builder("slow")
        .method(
            "wait",
            MethodOptions::new()
                .verb("GET")
                .url("/slow")
                .config(json!({"timeout": 100})),
        )
        .build()
        .expect("service");

    let result = slow.call("wait", &[]).await;

    let_assert!(Err(Error::Rejected(error)) = result);
    check!(error["status"] == -1);
}

#[tokio::test]
async fn test_retry_replays_transient_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let flaky = client
        .service_builder("flaky")
        .method(
            "get",
            MethodOptions::new()
                .verb("GET")
                .url("/flaky")
                .error(Retry::new(2).with_backoff(Duration::from_millis(10))),
        )
        .build()
        .expect("service");

    let response = flaky.call("get", &[]).await.expect("retried");

    check!(response["status"] == 200);
    check!(response["data"] == json!({"ok": true}));
}

#[tokio::test]
async fn test_retry_gives_up_after_max_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let down = client
        .service_builder("down")
        .method(
            "get",
            MethodOptions::new().verb("GET").url("/down").error(Retry::new(2)),
        )
        .build()
        .expect("service");

    let result = down.call("get", &[]).await;

    let_assert!(Err(Error::Rejected(error)) = result);
    check!(error["status"] == 500);
}

#[tokio::test]
async fn test_retry_skips_requests_that_cannot_be_built() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let transport = HyperTransport::builder()
        .layer(tether::tower::util::MapRequestLayer::new(
            move |config: TransportConfig| {
                counter.fetch_add(1, Ordering::SeqCst);
                config
            },
        ))
        .build();

    // default base url is "/", so "/relative" stays relative
    let client = ApiClient::from_hyper(transport);
    let service = client
        .service_builder("relative")
        .method(
            "get",
            MethodOptions::new()
                .verb("GET")
                .url("/relative")
                .error(Retry::new(3)),
        )
        .build()
        .expect("service");

    let result = service.call("get", &[]).await;

    let_assert!(Err(Error::Rejected(error)) = result);
    check!(error["status"] == 0);
    check!(error["code"] == INVALID_REQUEST);
    check!(attempts.load(Ordering::SeqCst) == 1);
}

#[tokio::test]
async fn test_bearer_auth_middleware() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    client
        .register_middleware("auth", tether::Middleware::request(BearerAuth::new("secret")))
        .expect("registered");
    let me = client
        .service_builder("me")
        .all(MethodOptions::new().request_named("auth"))
        .method("get", MethodOptions::new().verb("GET").url("/me"))
        .build()
        .expect("service");

    let response = me.call("get", &[]).await.expect("response");

    check!(response["data"]["id"] == 1);
}

#[tokio::test]
async fn test_bearer_auth_and_logging_layers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/layered"))
        .and(header("Authorization", "Bearer layered"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let transport = HyperTransport::builder()
        .base_url(mock_server.uri())
        .with_bearer_auth("layered")
        .with_debug_logging()
        .build();
    let client = ApiClient::from_hyper(transport);

    let response = client
        .execute(TransportConfig::new(tether::Method::GET, "/layered"))
        .await
        .expect("response");

    check!(response["status"] == 200);
}

#[tokio::test]
async fn test_error_middleware_converts_to_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/optional"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let optional = client
        .service_builder("optional")
        .method(
            "get",
            MethodOptions::new()
                .verb("GET")
                .url("/optional")
                .error(|_: &Request, error: Value| {
                    if error["status"] == 404 {
                        Step::resolve(Some(json!({"fallback": true})))
                    } else {
                        Step::next()
                    }
                })
                .success(|_: &Request, _: Value| Step::value(json!("unreachable"))),
        )
        .build()
        .expect("service");

    let response = optional.call("get", &[]).await.expect("converted");

    check!(response == json!({"fallback": true}));
}
