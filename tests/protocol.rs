//! Dispatch boundary behavior: content-type gate, error documents,
//! method routing.

mod common;

use jsonapi_engine::handlers::{Endpoint, Method, Request, MEDIA_TYPE};
use jsonapi_engine::store::ResourceStore;
use serde_json::json;

#[test]
fn test_mutating_requests_require_media_type() {
    let api = common::api();
    let mut store = common::store();

    let request = Request::patch_resource(
        "posts",
        "1",
        json!({"data": {"type": "posts", "id": "1", "attributes": {"title": "X"}}}),
    )
    .with_content_type(None);
    let response = api.handle(&mut store, &common::admin(), &request);
    assert_eq!(response.status, 409);
    assert_eq!(
        response.document.unwrap()["errors"][0]["code"],
        "missing_content_type"
    );

    let request = Request::delete_resource("comments", "1").with_content_type(Some("text/plain"));
    let response = api.handle(&mut store, &common::admin(), &request);
    assert_eq!(response.status, 409);
    // Nothing happened.
    assert!(store.fetch("comments", "1").unwrap().is_some());
}

#[test]
fn test_get_requests_need_no_media_type() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_collection("posts"),
    );
    assert_eq!(response.status, 200);
}

#[test]
fn test_error_documents_are_jsonapi_conformant() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "99"),
    );
    let document = response.document.unwrap();
    let error = &document["errors"][0];
    assert_eq!(error["status"], "404");
    assert_eq!(error["code"], "resource_not_found");
    assert_eq!(error["title"], "Resource Not Found");
    assert!(error["detail"].as_str().unwrap().contains("posts"));
    // Per-occurrence UUID.
    assert_eq!(error["id"].as_str().unwrap().len(), 36);
    assert_eq!(document["jsonapi"]["version"], "1.0");
    assert!(document["meta"]["jsonapi_engine_version"].is_string());
}

#[test]
fn test_unsupported_method_endpoint_pair_is_400() {
    let api = common::api();
    let mut store = common::store();
    let mut request = Request::post_collection(
        "posts",
        json!({"data": {"type": "posts", "attributes": {"title": "X"}}}),
    );
    request.endpoint = Endpoint::Related;
    request.id = Some("1".to_string());
    request.relationship = Some("comments".to_string());
    let response = api.handle(&mut store, &common::admin(), &request);
    assert_eq!(response.status, 400);
}

#[test]
fn test_success_documents_carry_envelope_members() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "1"),
    );
    let document = response.document.unwrap();
    assert_eq!(document["jsonapi"]["version"], "1.0");
    assert!(document["meta"]["jsonapi_engine_version"].is_string());
}

#[test]
fn test_relationship_links_point_at_protocol_paths() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "1"),
    );
    let document = response.document.unwrap();
    let links = &document["data"]["relationships"]["comments"]["links"];
    assert_eq!(links["self"], "/posts/1/relationships/comments/");
    assert_eq!(links["related"], "/posts/1/comments/");
}

#[test]
fn test_request_constructors_fill_method_and_endpoint() {
    let request = Request::get_relationship("posts", "1", "comments");
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.endpoint, Endpoint::Relationship);
    assert_eq!(request.content_type, None);

    let request = Request::delete_relationship("posts", "1", "comments", json!({"data": []}));
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.content_type.as_deref(), Some(MEDIA_TYPE));
}
