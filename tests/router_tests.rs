//! Router construction from route tables and OpenAPI documents.

use http::Method;
use serde_json::json;
use siesta::echo::{echo_registry, EchoHandler};
use siesta::router::{HandlerRegistry, RouteEntry, Router};
use siesta::SiestaError;

fn registry() -> HandlerRegistry {
    let mut registry = echo_registry();
    registry.register("list_pets", EchoHandler);
    registry.register("get_pet", EchoHandler);
    registry.register("add_photo", EchoHandler);
    registry
}

fn petstore() -> serde_json::Value {
    json!({
        "openapi": "3.1.0",
        "servers": [{ "url": "https://api.example.com/v2/" }],
        "paths": {
            "/pets": {
                "get": { "operationId": "list_pets" },
                "post": { "summary": "no handler name" }
            },
            "/pets/{id}": {
                "get": { "operationId": "ignored", "x-handler-get": "get_pet" }
            },
            "/pets/{id}/photos/{photo}": {
                "put": { "operationId": "add_photo" }
            }
        }
    })
}

#[test]
fn test_openapi_entries() {
    let mut entries = RouteEntry::from_openapi(&petstore()).unwrap();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(
        entries,
        vec![
            RouteEntry::new("/v2/pets", "GET", "list_pets"),
            RouteEntry::new("/v2/pets/*", "GET", "get_pet"),
            RouteEntry::new("/v2/pets/*/photos/*", "PUT", "add_photo"),
        ]
    );
}

#[test]
fn test_router_from_openapi() {
    let entries = RouteEntry::from_openapi(&petstore()).unwrap();
    let router = Router::from_entries(&entries, &registry()).unwrap();
    assert_eq!(router.route_count(), 3);

    let found = router.lookup(&Method::PUT, "/v2/pets/7/photos/front").unwrap();
    assert_eq!(found.wildcards.get(0), Some("7"));
    assert_eq!(found.wildcards.get(1), Some("front"));
    assert_eq!(found.wildcards.len(), 2);

    assert!(router.lookup(&Method::GET, "/v2/pets").unwrap().wildcards.is_empty());
    assert!(router.lookup(&Method::POST, "/v2/pets").is_none());
    assert_eq!(router.allowed_methods("/v2/pets"), vec![Method::GET]);
    assert!(router.contains("/v2/pets/9/photos"));
    assert!(!router.contains("/pets"));
}

#[test]
fn test_openapi_without_paths_is_rejected() {
    let err = RouteEntry::from_openapi(&json!({ "openapi": "3.1.0" })).unwrap_err();
    assert!(matches!(err, SiestaError::InvalidRoute(_)));
}

#[test]
fn test_route_table_from_yaml() {
    let yaml = r"
- path: /v1/echo
  verb: get
  handler: echo
- path: /v1/echo/*
  verb: Get
  handler: echo
";
    let entries: Vec<RouteEntry> = serde_yaml::from_str(yaml).unwrap();
    let router = Router::from_entries(&entries, &echo_registry()).unwrap();
    assert_eq!(router.route_count(), 2);
    assert!(router.lookup(&Method::GET, "/v1/echo/anything").is_some());
}

#[test]
fn test_unknown_handler_is_rejected() {
    let entries = vec![RouteEntry::new("/v1/echo", "GET", "missing")];
    let err = Router::from_entries(&entries, &echo_registry()).unwrap_err();
    match err {
        SiestaError::UnknownHandler(name) => assert_eq!(name, "missing"),
        other => panic!("expected UnknownHandler, got {other:?}"),
    }
}

#[test]
fn test_bad_verb_is_rejected() {
    let entries = vec![RouteEntry::new("/v1/echo", "GE T", "echo")];
    let err = Router::from_entries(&entries, &echo_registry()).unwrap_err();
    assert!(matches!(err, SiestaError::InvalidRoute(_)));
}

#[test]
fn test_literal_route_shadows_wildcard_per_verb() {
    let entries = vec![
        RouteEntry::new("/files/*", "GET", "echo"),
        RouteEntry::new("/files/latest", "POST", "echo"),
    ];
    let router = Router::from_entries(&entries, &echo_registry()).unwrap();

    // POST hits the literal node.
    assert!(router.lookup(&Method::POST, "/files/latest").unwrap().wildcards.is_empty());
    // GET backtracks to the wildcard and captures the literal text.
    let get = router.lookup(&Method::GET, "/files/latest").unwrap();
    assert_eq!(get.wildcards.get(0), Some("latest"));
}
