//! Single-resource endpoint behavior: fetch, update, delete.

mod common;

use jsonapi_engine::handlers::Request;
use jsonapi_engine::store::ResourceStore;
use serde_json::json;

#[test]
fn test_get_resource_renders_full_object() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "1"),
    );
    assert_eq!(response.status, 200);
    let document = response.document.unwrap();
    assert_eq!(document["data"]["id"], "1");
    assert_eq!(document["data"]["type"], "posts");
    assert_eq!(document["data"]["attributes"]["title"], "Alpha");
    // The foreign key backing the author relationship never renders.
    assert!(document["data"]["attributes"].get("author_id").is_none());
    assert_eq!(document["jsonapi"]["version"], "1.0");
}

#[test]
fn test_get_resource_missing_is_404() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "99"),
    );
    assert_eq!(response.status, 404);
    assert_eq!(
        response.document.unwrap()["errors"][0]["code"],
        "resource_not_found"
    );
}

#[test]
fn test_get_resource_view_denial_is_403() {
    let api = common::api();
    let mut store = common::store();
    // posts/2 is an unpublished draft.
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "2"),
    );
    assert_eq!(response.status, 403);
    assert_eq!(
        response.document.unwrap()["errors"][0]["code"],
        "permission_denied"
    );

    let response = api.handle(&mut store, &common::admin(), &Request::get_resource("posts", "2"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_get_resource_includes_deduplicate() {
    let api = common::api();
    let mut store = common::store();
    // ann authored posts/1 and comments/2; she must side-load once.
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "1").with_query("include", "author,comments.author"),
    );
    assert_eq!(response.status, 200);
    let document = response.document.unwrap();
    let included = document["included"].as_array().unwrap();
    let users: Vec<&serde_json::Value> = included
        .iter()
        .filter(|entry| entry["type"] == "users" && entry["id"] == "1")
        .collect();
    assert_eq!(users.len(), 1);
    // Password is VIEW-denied everywhere, included resources too.
    assert!(users[0]["attributes"].get("password").is_none());
}

#[test]
fn test_get_resource_include_of_attribute_is_400() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::anonymous(),
        &Request::get_resource("posts", "1").with_query("include", "title"),
    );
    assert_eq!(response.status, 400);
    assert_eq!(
        response.document.unwrap()["errors"][0]["code"],
        "not_a_relationship"
    );
}

#[test]
fn test_sparse_fieldsets_are_idempotent() {
    let api = common::api();
    let mut store = common::store();
    let request = Request::get_resource("posts", "1").with_query("fields[posts]", "title,content");
    let first = api.handle(&mut store, &common::anonymous(), &request);
    let second = api.handle(&mut store, &common::anonymous(), &request);

    let first = first.document.unwrap();
    assert_eq!(
        first["data"]["attributes"],
        json!({"content": "Alpha content", "title": "Alpha"})
    );
    assert!(first["data"]["relationships"].as_object().unwrap().is_empty());
    assert_eq!(
        serde_json::to_string(&first["data"]).unwrap(),
        serde_json::to_string(&second.document.unwrap()["data"]).unwrap()
    );
}

#[test]
fn test_patch_resource_updates_attributes() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource(
            "posts",
            "1",
            json!({
                "data": {
                    "type": "posts",
                    "id": "1",
                    "attributes": {"title": "Alpha, revised"},
                }
            }),
        ),
    );
    assert_eq!(response.status, 200);
    assert_eq!(
        response.document.unwrap()["data"]["attributes"]["title"],
        "Alpha, revised"
    );
    assert_eq!(
        store
            .attribute(&store.fetch("posts", "1").unwrap().unwrap(), "title")
            .unwrap(),
        json!("Alpha, revised")
    );
}

#[test]
fn test_patch_resource_payload_identity_rules() {
    let api = common::api();
    let mut store = common::store();

    // Missing type or id.
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource("posts", "1", json!({"data": {"type": "posts"}})),
    );
    assert_eq!(response.status, 400);

    // Type mismatch.
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource("posts", "1", json!({"data": {"type": "users", "id": "1"}})),
    );
    assert_eq!(response.status, 409);
    assert_eq!(
        response.document.unwrap()["errors"][0]["code"],
        "invalid_type_for_endpoint"
    );

    // Id mismatch.
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource("posts", "1", json!({"data": {"type": "posts", "id": "2"}})),
    );
    assert_eq!(response.status, 400);
}

#[test]
fn test_patch_resource_sets_to_one_relationship_null() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource(
            "comments",
            "1",
            json!({
                "data": {
                    "type": "comments",
                    "id": "1",
                    "relationships": {"author": {"data": null}},
                }
            }),
        ),
    );
    assert_eq!(response.status, 200);
    assert_eq!(
        response.document.unwrap()["data"]["relationships"]["author"]["data"],
        serde_json::Value::Null
    );
}

#[test]
fn test_patch_resource_replaces_to_many_membership() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource(
            "posts",
            "1",
            json!({
                "data": {
                    "type": "posts",
                    "id": "1",
                    "relationships": {
                        "comments": {"data": [{"type": "comments", "id": "2"}]},
                    },
                }
            }),
        ),
    );
    assert_eq!(response.status, 200);
    let document = response.document.unwrap();
    assert_eq!(
        document["data"]["relationships"]["comments"]["data"],
        json!([{"id": "2", "type": "comments"}])
    );
}

#[test]
fn test_patch_resource_unknown_relationship_is_404() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource(
            "posts",
            "1",
            json!({
                "data": {
                    "type": "posts",
                    "id": "1",
                    "relationships": {"reviewer": {"data": null}},
                }
            }),
        ),
    );
    assert_eq!(response.status, 404);
    assert_eq!(
        response.document.unwrap()["errors"][0]["code"],
        "relationship_not_found"
    );
}

#[test]
fn test_patch_resource_failure_rolls_back_earlier_writes() {
    let api = common::api();
    let mut store = common::store();
    // The attribute write lands first, then the dangling linkage fails;
    // the whole patch must vanish.
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::patch_resource(
            "posts",
            "1",
            json!({
                "data": {
                    "type": "posts",
                    "id": "1",
                    "attributes": {"title": "Mutated"},
                    "relationships": {
                        "author": {"data": {"type": "users", "id": "99"}},
                    },
                }
            }),
        ),
    );
    assert_eq!(response.status, 404);
    assert_eq!(
        store
            .attribute(&store.fetch("posts", "1").unwrap().unwrap(), "title")
            .unwrap(),
        json!("Alpha")
    );
}

#[test]
fn test_delete_resource_returns_204_without_body() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::delete_resource("comments", "1"),
    );
    assert_eq!(response.status, 204);
    assert!(response.document.is_none());
    assert!(store.fetch("comments", "1").unwrap().is_none());
}

#[test]
fn test_delete_resource_cascades_to_comments() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::delete_resource("posts", "1"),
    );
    assert_eq!(response.status, 204);
    assert!(store.fetch("posts", "1").unwrap().is_none());
    assert!(store.fetch("comments", "1").unwrap().is_none());
    assert!(store.fetch("comments", "2").unwrap().is_none());
    // The authors survive, with the dead linkage pruned.
    let ann = store.fetch("users", "1").unwrap().unwrap();
    assert_eq!(
        store.get_relationship(&ann, "comments").unwrap(),
        jsonapi_engine::store::Related::Many(vec![])
    );
}

#[test]
fn test_delete_resource_missing_is_404() {
    let api = common::api();
    let mut store = common::store();
    let response = api.handle(
        &mut store,
        &common::admin(),
        &Request::delete_resource("posts", "99"),
    );
    assert_eq!(response.status, 404);
}
