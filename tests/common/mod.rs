//! Shared blog fixture for the integration suite.
//!
//! Three types: `users` write `posts`, which collect `comments`. Posts are
//! visible when published, or to the `admin` actor. User passwords are
//! never visible. Deleting a post cascades to its comments.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use jsonapi_engine::handlers::JsonApi;
use jsonapi_engine::permissions::{Permission, RequestContext};
use jsonapi_engine::registry::{Attribute, Registry, Relationship, ResourceType};
use jsonapi_engine::store::{MemoryStore, Related, ResourceStore};
use serde_json::json;

fn posts_visible(
    ctx: &RequestContext,
    store: &dyn ResourceStore,
    instance: Option<&jsonapi_engine::store::InstanceRef>,
) -> bool {
    if ctx.actor.as_deref() == Some("admin") {
        return true;
    }
    let Some(instance) = instance else {
        return true;
    };
    store
        .attribute(instance, "is_published")
        .map_or(false, |value| value == json!(true))
}

pub fn registry() -> Registry {
    Registry::builder()
        .register(
            ResourceType::builder("users")
                .attribute("name")
                .attribute("username")
                .attribute(Attribute::new("password").unsortable())
                .permission(Some("password"), Permission::View, |_, _, _| false)
                .relationship(
                    Relationship::to_many("posts", "posts").with_back_reference("author"),
                )
                .relationship(
                    Relationship::to_many("comments", "comments").with_back_reference("author"),
                )
                .build(),
        )
        .register(
            ResourceType::builder("posts")
                .attribute("title")
                .attribute("content")
                .attribute(Attribute::new("is_published").unsortable())
                .attribute("created")
                .attribute("author_id")
                .permission(None, Permission::View, posts_visible)
                .relationship(
                    Relationship::to_one("author", "users")
                        .with_foreign_key("author_id")
                        .with_back_reference("posts"),
                )
                .relationship(
                    Relationship::to_many("comments", "comments")
                        .with_back_reference("post")
                        .cascading_delete(),
                )
                .build(),
        )
        .register(
            ResourceType::builder("comments")
                .attribute("body")
                .attribute("created")
                .relationship(
                    Relationship::to_one("author", "users").with_back_reference("comments"),
                )
                .relationship(Relationship::to_one("post", "posts").with_back_reference("comments"))
                .build(),
        )
        .build()
        .expect("fixture registry must build")
}

fn created(day: u32) -> String {
    Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0)
        .unwrap()
        .to_rfc3339()
}

/// Seeds the canonical fixture graph:
///
/// - ann (users/1) wrote posts/1 (published) and posts/2 (draft)
/// - ben (users/2) wrote posts/3 (published)
/// - posts/1 carries comments/1 (by ben) and comments/2 (by ann)
pub fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.define_type("users");
    store.define_to_many("users", "posts");
    store.define_to_many("users", "comments");
    store.define_type("posts");
    store.define_to_one("posts", "author");
    store.define_to_many("posts", "comments");
    store.require("posts", "title");
    store.define_type("comments");
    store.define_to_one("comments", "author");
    store.define_to_one("comments", "post");

    let ann = store
        .insert(
            "users",
            "1",
            json!({"name": "Ann", "username": "ann", "password": "hunter2"}),
        )
        .unwrap();
    let ben = store
        .insert(
            "users",
            "2",
            json!({"name": "Ben", "username": "ben", "password": "swordfish"}),
        )
        .unwrap();

    let posts = [
        ("1", "Alpha", true, &ann, 1),
        ("2", "Beta", false, &ann, 2),
        ("3", "Gamma", true, &ben, 3),
    ];
    for (id, title, published, author, day) in posts {
        let post = store
            .insert(
                "posts",
                id,
                json!({
                    "title": title,
                    "content": format!("{title} content"),
                    "is_published": published,
                    "created": created(day),
                    "author_id": author.id.clone(),
                }),
            )
            .unwrap();
        store
            .set_relationship(&post, "author", Related::One(Some(author.clone())))
            .unwrap();
        store.append_relationship(author, "posts", &post).unwrap();
    }

    let post_one = store.fetch("posts", "1").unwrap().unwrap();
    let comments = [("1", "First!", &ben), ("2", "Thanks!", &ann)];
    for (id, body, author) in comments {
        let comment = store
            .insert(
                "comments",
                id,
                json!({"body": body, "created": created(10)}),
            )
            .unwrap();
        store
            .set_relationship(&comment, "author", Related::One(Some(author.clone())))
            .unwrap();
        store
            .set_relationship(&comment, "post", Related::One(Some(post_one.clone())))
            .unwrap();
        store
            .append_relationship(&post_one, "comments", &comment)
            .unwrap();
        store
            .append_relationship(author, "comments", &comment)
            .unwrap();
    }
    store
}

pub fn api() -> JsonApi {
    JsonApi::new(registry())
}

pub fn admin() -> RequestContext {
    RequestContext::for_actor("admin")
}

pub fn anonymous() -> RequestContext {
    RequestContext::anonymous()
}

/// Ids of the primary data entries, in document order.
pub fn data_ids(document: &serde_json::Value) -> Vec<String> {
    document["data"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| entry["id"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default()
}
