//! Tests for the middleware and service registries.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert2::{check, let_assert};
use serde_json::{Value, json};
use tether::{
    ApiClient, Error, MethodOptions, Middleware, Request, Step, Transport, TransportConfig,
    transport_fn,
};

fn echo() -> impl Transport {
    transport_fn(|config: TransportConfig| async move {
        Ok(serde_json::to_value(config).unwrap_or_default())
    })
}

fn failing(status: u16) -> impl Transport {
    transport_fn(move |_: TransportConfig| async move { Err(json!({"status": status})) })
}

fn recording_client() -> (ApiClient<impl Transport>, Arc<std::sync::Mutex<Vec<String>>>) {
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let client = ApiClient::new(echo(), "https://api.example.com/v2");

    for name in ["first", "second"] {
        let log = Arc::clone(&log);
        client
            .register_middleware(
                name,
                Middleware::request(move |req: &mut Request| {
                    log.lock().expect("lock").push(name.to_string());
                    req.insert("params", json!({"by": name}));
                    Step::next()
                }),
            )
            .expect("registered");
    }
    client
        .register_middleware(
            "unwrap",
            Middleware::response(|_: &Request, res: Value| Step::value(res["url"].clone())),
        )
        .expect("registered");

    (client, log)
}

#[tokio::test]
async fn test_named_middlewares_run_in_declaration_order() {
    let (client, log) = recording_client();

    let service = client
        .service_builder("items")
        .all(MethodOptions::new().request_named("first"))
        .method_value(
            "list",
            json!({
                "verb": "GET",
                "url": "/items",
                "request": ["second"],
                "success": ["unwrap"]
            }),
        )
        .build()
        .expect("service");

    let url = service.call("list", &[]).await.expect("resolved");

    check!(url == "https://api.example.com/v2/items");
    check!(*log.lock().expect("lock") == vec!["first", "second"]);
}

#[tokio::test]
async fn test_named_middleware_errors() {
    let (client, _) = recording_client();

    let result = client
        .service_builder("broken")
        .method_value("m", json!({"verb": "GET", "url": "/", "request": ["nope"]}))
        .build();
    let_assert!(Err(Error::UnknownMiddleware(name)) = result);
    check!(name == "nope");

    let result = client
        .service_builder("broken")
        .method_value("m", json!({"verb": "GET", "url": "/", "success": ["first"]}))
        .build();
    let_assert!(Err(Error::InvalidMiddleware { name, chain }) = result);
    check!(name == "first");
    check!(chain == "success");
}

#[tokio::test]
async fn test_services_share_client_registries() {
    let (client, _) = recording_client();
    let constructed = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&constructed);
    client
        .register_service("items", move |client| {
            counter.fetch_add(1, Ordering::SeqCst);
            client
                .service_builder("items")
                .method(
                    "get",
                    MethodOptions::new()
                        .verb("GET")
                        .pattern("/items/:id")
                        .args(|req, args| {
                            req.set_url_param("id", args.first().cloned().unwrap_or_default());
                        })
                        .success_named("unwrap"),
                )
                .build()
        })
        .expect("registered");

    let (a, b) = tokio::join!(
        async { client.service("items").expect("service").call("get", &[json!(1)]).await },
        async { client.service("items").expect("service").call("get", &[json!(2)]).await },
    );

    check!(a.expect("resolved") == "https://api.example.com/v2/items/1");
    check!(b.expect("resolved") == "https://api.example.com/v2/items/2");
    check!(constructed.load(Ordering::SeqCst) == 1);
}

#[tokio::test]
async fn test_missing_mandatory_parameter_rejects_call() {
    let client = ApiClient::new(echo(), "/");
    let service = client
        .service_builder("items")
        .method("get", MethodOptions::new().verb("GET").pattern("/items/:id"))
        .build()
        .expect("service");

    let result = service.call("get", &[]).await;

    let_assert!(Err(error) = result);
    check!(error.is_missing_parameter());
}

#[tokio::test]
async fn test_unknown_method_and_service() {
    let client = ApiClient::new(echo(), "/");
    client
        .register_service("empty", |client| client.service_builder("empty").build())
        .expect("registered");

    let service = client.service("empty").expect("service");
    let_assert!(Err(Error::UnknownMethod(name)) = service.call("missing", &[]).await);
    check!(name == "missing");

    let_assert!(Err(Error::UnknownService(name)) = client.service("other"));
    check!(name == "other");
}

#[tokio::test]
async fn test_error_chain_from_registry() {
    let client = ApiClient::new(failing(502), "/");
    client
        .register_middleware(
            "annotate",
            Middleware::response(|_: &Request, mut err: Value| {
                err["annotated"] = json!(true);
                Step::value(err)
            }),
        )
        .expect("registered");

    let service = client
        .service_builder("gateway")
        .all(MethodOptions::new().error_named("annotate"))
        .method("get", MethodOptions::new().verb("GET").url("/"))
        .build()
        .expect("service");

    let result = service.call("get", &[]).await;

    let_assert!(Err(error) = result);
    check!(error.rejection() == Some(&json!({"status": 502, "annotated": true})));
}

#[test]
fn test_registry_error_messages() {
    let client = ApiClient::new(echo(), "/");
    client
        .register_service("items", |client| client.service_builder("items").build())
        .expect("registered");

    let err = client
        .register_service("items", |client| client.service_builder("items").build())
        .expect_err("duplicate");
    insta::assert_snapshot!(err.to_string(), @r#"service "items" is already registered"#);

    let err = client.service("users").expect_err("unknown");
    insta::assert_snapshot!(err.to_string(), @r#"unknown service "users""#);

    let err = client
        .register_middleware("", Middleware::request(|_: &mut Request| Step::next()))
        .expect_err("empty name");
    insta::assert_snapshot!(err.to_string(), @"invalid middleware name");
}
