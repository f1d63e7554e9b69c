//! Router tests driving [`api_router`] over an in-memory store.

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode},
};
use folio_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{ApiState, Directory, api_router, caller::USER_HEADER};

const ALICE: Uuid = Uuid::from_u128(0xa11ce);
const BOB: Uuid = Uuid::from_u128(0xb0b);

async fn app() -> Router {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  api_router(ApiState::new(store, Directory::default()))
}

async fn call(
  app: &Router,
  method: Method,
  uri: &str,
  user: Option<Uuid>,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut request = Request::builder().method(method).uri(uri);
  if let Some(user) = user {
    request = request.header(USER_HEADER, user.to_string());
  }
  let body = match body {
    Some(body) => {
      request = request.header("content-type", "application/json");
      Body::from(body.to_string())
    }
    None => Body::empty(),
  };
  let response = app
    .clone()
    .oneshot(request.body(body).unwrap())
    .await
    .unwrap();
  let status = response.status();
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

fn uuid_of(body: &Value) -> Uuid {
  body["uuid"].as_str().and_then(|s| s.parse().ok()).expect("uuid in body")
}

async fn persist(app: &Router, collection: &str, uuid: Uuid) {
  let (status, at) = call(
    app,
    Method::GET,
    &format!("/{collection}/{uuid}/last_update"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let (status, _) = call(
    app,
    Method::POST,
    &format!("/{collection}/{uuid}/persist"),
    Some(ALICE),
    Some(json!({ "last_update": at })),
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);
}

async fn create_and_persist_in(app: &Router, collection: &str, body: Value) -> Uuid {
  let path = format!("/{collection}");
  let (status, created) = call(app, Method::POST, &path, Some(ALICE), Some(body)).await;
  assert_eq!(status, StatusCode::CREATED);
  let uuid = uuid_of(&created);
  persist(app, collection, uuid).await;
  uuid
}

async fn create_and_persist(app: &Router, body: Value) -> Uuid {
  create_and_persist_in(app, "templates", body).await
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn template_round_trip_over_http() {
  let app = app().await;
  let uuid = create_and_persist(&app, json!({ "name": "t", "fields": [{ "name": "f" }] })).await;

  let (status, view) =
    call(&app, Method::GET, &format!("/templates/{uuid}"), Some(ALICE), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(view["name"], "t");
  assert_eq!(view["fields"][0]["name"], "f");
  assert!(view["_id"].is_string());

  let (_, existing) =
    call(&app, Method::GET, &format!("/templates/{uuid}/draft_existing"), Some(ALICE), None).await;
  assert_eq!(existing, json!(false));

  let (status, _) = call(
    &app,
    Method::PUT,
    &format!("/templates/{uuid}"),
    Some(ALICE),
    Some(json!({ "name": "renamed" })),
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, draft) =
    call(&app, Method::GET, &format!("/templates/{uuid}/draft"), Some(ALICE), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(draft["name"], "renamed");

  let (status, _) =
    call(&app, Method::DELETE, &format!("/templates/{uuid}/draft"), Some(ALICE), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (_, existing) =
    call(&app, Method::GET, &format!("/templates/{uuid}/draft_existing"), Some(ALICE), None).await;
  assert_eq!(existing, json!(false));
}

#[tokio::test]
async fn persisted_before_takes_a_timestamp_segment() {
  let app = app().await;
  let uuid = create_and_persist(&app, json!({ "name": "t" })).await;

  let (status, _) = call(
    &app,
    Method::GET,
    &format!("/templates/{uuid}/2000-01-01T00:00:00.000Z"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, view) = call(
    &app,
    Method::GET,
    &format!("/templates/{uuid}/2999-01-01T00:00:00.000Z"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(view["name"], "t");

  let (status, body) =
    call(&app, Method::GET, &format!("/templates/{uuid}/yesterday"), Some(ALICE), None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn stale_persist_is_a_bad_request() {
  let app = app().await;
  let (_, created) =
    call(&app, Method::POST, "/templates", Some(ALICE), Some(json!({ "name": "t" }))).await;
  let uuid = uuid_of(&created);

  let (status, body) = call(
    &app,
    Method::POST,
    &format!("/templates/{uuid}/persist"),
    Some(ALICE),
    Some(json!({ "last_update": "2000-01-01T00:00:00.000Z" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("last update"));
}

// ─── Access ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn denials_distinguish_anonymous_callers() {
  let app = app().await;
  let uuid = create_and_persist(&app, json!({ "name": "private" })).await;
  let path = format!("/templates/{uuid}");

  let (status, _) = call(&app, Method::GET, &path, None, None).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  let (status, _) = call(&app, Method::GET, &path, Some(BOB), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let (status, _) =
    call(&app, Method::POST, "/templates", None, Some(json!({ "name": "t" }))).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_documents_are_not_found() {
  let app = app().await;
  let (status, _) = call(
    &app,
    Method::GET,
    &format!("/template_fields/{}/draft", Uuid::new_v4()),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn permissions_are_listed_and_replaced() {
  let app = app().await;
  let uuid = create_and_persist(&app, json!({ "name": "t" })).await;
  let path = format!("/permissions/{uuid}");

  let (status, _) = call(
    &app,
    Method::PUT,
    &path,
    Some(ALICE),
    Some(json!({ "level": "view", "users": [BOB] })),
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, entries) = call(&app, Method::GET, &path, Some(ALICE), None).await;
  assert_eq!(status, StatusCode::OK);
  let levels: Vec<_> = entries
    .as_array()
    .unwrap()
    .iter()
    .map(|e| (e["user_id"].as_str().unwrap().to_owned(), e["level"].as_str().unwrap().to_owned()))
    .collect();
  assert!(levels.contains(&(BOB.to_string(), "view".to_owned())));
  assert!(levels.contains(&(ALICE.to_string(), "admin".to_owned())));

  let (status, view) =
    call(&app, Method::GET, &format!("/templates/{uuid}"), Some(BOB), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(view["name"], "t");

  let (status, _) = call(&app, Method::GET, &path, Some(BOB), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

// ─── Datasets ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_for_template_is_routed_ahead_of_dataset_uuids() {
  let app = app().await;
  let input = json!({ "name": "t", "related_templates": [{ "name": "r" }] });
  let template = create_and_persist(&app, input).await;

  let (status, skeleton) = call(
    &app,
    Method::GET,
    &format!("/datasets/new_for_template/{template}"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(skeleton["related_datasets"].as_array().map(Vec::len), Some(1));

  let (status, created) = call(&app, Method::POST, "/datasets", Some(ALICE), Some(skeleton)).await;
  assert_eq!(status, StatusCode::CREATED);
  let dataset = uuid_of(&created);
  let (status, draft) =
    call(&app, Method::GET, &format!("/datasets/{dataset}/draft"), Some(ALICE), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(draft["related_datasets"][0]["group_uuid"], draft["group_uuid"]);
}

/// A persisted dataset on a one-field template, with its title field uuid.
async fn titled_dataset(app: &Router) -> (Uuid, Uuid) {
  let input = json!({ "name": "t", "fields": [{ "name": "title" }] });
  let template = create_and_persist(app, input).await;
  let (_, view) =
    call(app, Method::GET, &format!("/templates/{template}"), Some(ALICE), None).await;
  let title = uuid_of(&view["fields"][0]);
  let dataset =
    create_and_persist_in(app, "datasets", json!({ "template_id": view["_id"] })).await;
  (dataset, title)
}

fn titled(dataset: Uuid, title: Uuid, value: &str) -> Value {
  json!({ "dataset_uuid": dataset, "fields": [{ "uuid": title, "value": value }] })
}

#[tokio::test]
async fn published_versions_freeze_the_record_list() {
  let app = app().await;
  let (dataset, title) = titled_dataset(&app).await;
  let first = create_and_persist_in(&app, "records", titled(dataset, title, "first")).await;

  let publish = format!("/datasets/{dataset}/publish");
  let (status, _) =
    call(&app, Method::POST, &publish, Some(ALICE), Some(json!({ "name": "v1" }))).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) =
    call(&app, Method::POST, &publish, Some(ALICE), Some(json!({ "name": "v1" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = call(&app, Method::POST, &publish, Some(ALICE), Some(json!({}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) =
    call(&app, Method::POST, &publish, Some(BOB), Some(json!({ "name": "v2" }))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  create_and_persist_in(&app, "records", titled(dataset, title, "second")).await;

  let (status, view) = call(
    &app,
    Method::GET,
    &format!("/datasets/{dataset}/published/v1"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(view["uuid"], json!(dataset));

  let (status, records) = call(
    &app,
    Method::GET,
    &format!("/datasets/{dataset}/published/v1/records"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let records = records.as_array().unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0]["uuid"], json!(first));
  assert_eq!(records[0]["fields"][0]["value"], "first");

  let (status, _) = call(
    &app,
    Method::GET,
    &format!("/datasets/{dataset}/published/nope"),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = call(
    &app,
    Method::GET,
    &format!("/datasets/{dataset}/published/v1/records"),
    Some(BOB),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_draft_from_latest_persisted_ignores_the_current_draft() {
  let app = app().await;
  let (dataset, title) = titled_dataset(&app).await;
  let record = create_and_persist_in(&app, "records", titled(dataset, title, "kept")).await;
  let (status, _) = call(
    &app,
    Method::PUT,
    &format!("/records/{record}"),
    Some(ALICE),
    Some(titled(dataset, title, "edited")),
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let path = format!("/records/{record}/new_draft_from_latest_persisted");
  let (status, draft) = call(&app, Method::GET, &path, Some(ALICE), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(draft["fields"][0]["value"], "kept");
  assert!(draft.get("_id").is_none());
  assert!(draft.get("persist_date").is_none());

  let (status, _) = call(&app, Method::GET, &path, Some(BOB), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _) = call(
    &app,
    Method::GET,
    &format!("/records/{}/new_draft_from_latest_persisted", Uuid::new_v4()),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── Listings ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn listings_split_public_from_viewable() {
  let app = app().await;
  let public = create_and_persist(
    &app,
    json!({ "name": "public", "public_date": "2000-01-01T00:00:00.000Z" }),
  )
  .await;
  let private = create_and_persist(&app, json!({ "name": "private" })).await;

  let (status, uuids) = call(&app, Method::GET, "/templates/all_public_uuids", None, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(uuids, json!([public]));

  let (_, uuids) = call(&app, Method::GET, "/templates/all_viewable_uuids", Some(BOB), None).await;
  assert_eq!(uuids, json!([public]));
  let (_, uuids) =
    call(&app, Method::GET, "/templates/all_viewable_uuids", Some(ALICE), None).await;
  let mut expected = vec![public, private];
  expected.sort();
  assert_eq!(uuids, json!(expected));
}

#[tokio::test]
async fn persisted_versions_are_addressed_by_id() {
  let app = app().await;
  let uuid = create_and_persist(&app, json!({ "name": "t" })).await;
  let (_, view) = call(&app, Method::GET, &format!("/templates/{uuid}"), Some(ALICE), None).await;
  let id = view["_id"].as_str().unwrap().to_owned();

  let path = format!("/templates/persisted_version/{id}");
  let (status, by_id) = call(&app, Method::GET, &path, Some(ALICE), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(by_id["uuid"], json!(uuid));
  assert_eq!(by_id["name"], "t");

  let (status, _) = call(&app, Method::GET, &path, Some(BOB), None).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _) = call(
    &app,
    Method::GET,
    &format!("/templates/persisted_version/{}", Uuid::new_v4()),
    Some(ALICE),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn all_public_fields_lists_only_public_fields() {
  let app = app().await;
  let public = create_and_persist_in(
    &app,
    "template_fields",
    json!({ "name": "shared", "public_date": "2000-01-01T00:00:00.000Z" }),
  )
  .await;
  create_and_persist_in(&app, "template_fields", json!({ "name": "hidden" })).await;

  let (status, fields) =
    call(&app, Method::GET, "/template_fields/all_public_fields", None, None).await;
  assert_eq!(status, StatusCode::OK);
  let fields = fields.as_array().unwrap();
  assert_eq!(fields.len(), 1);
  assert_eq!(fields[0]["uuid"], json!(public));
  assert_eq!(fields[0]["name"], "shared");
}
