// Relational backend integration tests against in-memory SQLite.

mod common;

use common::setup_test_db_with_tasks;
use common::task_entity::{self, Task};
use restplan::backend::relational::get_or_create;
use restplan::{ApiError, ErrorKind, QueryOutput, RawParams, RelationalResource};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use serde_json::{Value, json};

async fn query(db: &DatabaseConnection, query: &str) -> Result<QueryOutput, ApiError> {
    Task::get_collection(db, RawParams::from_query(query)).await
}

async fn query_json(db: &DatabaseConnection, params: &str) -> Value {
    query(db, params)
        .await
        .unwrap_or_else(|err| panic!("{params}: {err}"))
        .to_json()
}

fn titles(output: &Value) -> Vec<&str> {
    output["data"]
        .as_array()
        .expect("collection output")
        .iter()
        .map(|record| record["title"].as_str().expect("title"))
        .collect()
}

// ===== Collection mode =====

#[tokio::test]
async fn test_filtered_sorted_window() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let output = query_json(&db, "status=active&_sort=-created&_start=0&_limit=2").await;
    assert_eq!(output["total"], json!(5));
    assert_eq!(output["count"], json!(2));
    assert_eq!(titles(&output), vec!["refactor", "write tests"]);
}

#[tokio::test]
async fn test_limit_is_required() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let err = query(&db, "status=active").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.user_message(), "Missing _limit");
}

#[tokio::test]
async fn test_page_and_unbounded_windows() {
    let db = setup_test_db_with_tasks().await.unwrap();

    let output = query_json(&db, "_page=1&_limit=2&_sort=created").await;
    assert_eq!(output["total"], json!(7));
    assert_eq!(titles(&output), vec!["review pr", "deploy"]);

    let output = query_json(&db, "_start=5&_limit=-1&_sort=created").await;
    assert_eq!(titles(&output), vec!["plan sprint", "refactor"]);

    let output = query_json(&db, "_limit=-1").await;
    assert_eq!(output["count"], json!(7));
}

#[tokio::test]
async fn test_projection() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let output = query_json(&db, "_fields=title&_sort=created&_limit=1").await;
    assert_eq!(output["data"][0], json!({"id": 1, "title": "write docs"}));

    let output = query_json(&db, "_fields=title__as__name&_sort=created&_limit=1").await;
    assert_eq!(output["data"][0], json!({"id": 1, "name": "write docs"}));
}

#[tokio::test]
async fn test_unknown_projection_field() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let err = query(&db, "_fields=nope&_limit=1").await.unwrap_err();
    assert_eq!(err.user_message(), "Bad attribute 'nope'");
}

// ===== Predicates =====

#[tokio::test]
async fn test_operators() {
    let db = setup_test_db_with_tasks().await.unwrap();
    for (params, expected) in [
        ("priority__gte=3&_count", 2),
        ("priority__in=1,3&_count", 4),
        ("status__nin=done&_count", 5),
        ("title__istartswith=WRITE&_count", 2),
        ("title__endswith=tests&_count", 1),
        ("status__ne=active&_count", 2),
        ("note__exists=0&_count", 7),
        ("priority__gt=1&priority__lt=3&_count", 3),
        ("title__iexact=DEPLOY&_count", 1),
        ("priority=2&status=active&_count", 2),
    ] {
        assert_eq!(query_json(&db, params).await, json!(expected), "{params}");
    }
}

#[tokio::test]
async fn test_like_wildcards_are_literal() {
    let db = setup_test_db_with_tasks().await.unwrap();
    assert_eq!(query_json(&db, "title__contains=%25&_count").await, json!(0));
    assert_eq!(query_json(&db, "title__contains=_&_count").await, json!(0));
}

#[tokio::test]
async fn test_unknown_column() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let err = query(&db, "nope=1&_limit=1").await.unwrap_err();
    assert_eq!(err.user_message(), "Bad attribute 'nope'");

    let err = query(&db, "_sort=nope&_limit=1").await.unwrap_err();
    assert_eq!(err.user_message(), "Bad attribute 'nope'");
}

#[tokio::test]
async fn test_unsupported_directives() {
    let db = setup_test_db_with_tasks().await.unwrap();
    for (params, operation) in [
        ("_group=status&_limit=1", "_group"),
        ("_distinct=status&_limit=1", "_distinct"),
        ("_frequencies=status&_limit=1", "_frequencies"),
        ("_scalar=title&_limit=1", "_scalar"),
        ("title__all=a&_limit=1", "__all"),
        ("title__size=1&_limit=1", "__size"),
    ] {
        let err = query(&db, params).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "{params}");
        assert_eq!(
            err.user_message(),
            format!("`{operation}` is not supported on the relational backend")
        );
    }
}

// ===== Single record =====

#[tokio::test]
async fn test_first_and_count() {
    let db = setup_test_db_with_tasks().await.unwrap();
    assert_eq!(query_json(&db, "_first&_sort=-created").await["title"], json!("refactor"));
    assert_eq!(query_json(&db, "status=done&_count").await, json!(2));

    let err = query(&db, "_first&title=none").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_get_resource() {
    let db = setup_test_db_with_tasks().await.unwrap();

    let record = Task::get_resource(&db, RawParams::from_query("title=deploy"))
        .await
        .unwrap();
    assert_eq!(record["status"], json!("done"));

    let err = Task::get_resource(&db, RawParams::from_query("title=none"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), r#"'Task({"title":"none"})' resource not found"#);

    let err = Task::get_resource(&db, RawParams::from_query("status=active"))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Bad or Insufficient Params");

    assert!(Task::get(&db, RawParams::from_query("title=none")).await.unwrap().is_none());
}

// ===== Creation =====

#[tokio::test]
async fn test_get_or_create() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let defaults = || task_entity::ActiveModel {
        priority: Set(9),
        created: Set(8),
        ..Default::default()
    };

    let (created, was_created) =
        get_or_create::<Task, _>(&db, RawParams::from_query("title=triage&status=new"), defaults())
            .await
            .unwrap();
    assert!(was_created);
    assert_eq!(created["title"], json!("triage"));
    assert_eq!(created["status"], json!("new"));
    assert_eq!(created["priority"], json!(9));

    let (found, was_created) =
        get_or_create::<Task, _>(&db, RawParams::from_query("title=triage"), defaults())
            .await
            .unwrap();
    assert!(!was_created);
    assert_eq!(found["id"], created["id"]);
    assert_eq!(query_json(&db, "_count").await, json!(8));
}

#[tokio::test]
async fn test_unique_violation_is_conflict() {
    let db = setup_test_db_with_tasks().await.unwrap();
    let err = task_entity::ActiveModel {
        title: Set("deploy".to_string()),
        status: Set("active".to_string()),
        priority: Set(1),
        created: Set(9),
        ..Default::default()
    }
    .insert(&db)
    .await
    .unwrap_err();

    let err = ApiError::from(err);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.user_message(), "Must be unique 'title'");
}

#[tokio::test]
async fn test_failed_query_leaves_connection_usable() {
    let db = setup_test_db_with_tasks().await.unwrap();
    assert!(query(&db, "priority=high&_limit=1").await.is_err());
    assert_eq!(query_json(&db, "_count").await, json!(7));
}
