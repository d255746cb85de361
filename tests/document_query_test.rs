// Document backend integration tests: parameters in, JSON out, against the
// in-memory collection fixture.

mod common;

use common::{task_collection, task_schema};
use restplan::backend::document::DocumentCollection;
use restplan::{ApiError, DocumentResource, ErrorKind, MemoryCollection, QueryConfig, RawParams};
use serde_json::{Map, Value, json};

fn resource() -> DocumentResource<MemoryCollection> {
    DocumentResource::new(task_collection(), task_schema())
}

fn query(query: &str) -> Value {
    resource()
        .get_collection(RawParams::from_query(query))
        .unwrap_or_else(|err| panic!("{query}: {err}"))
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

fn query_err(query: &str) -> ApiError {
    match resource().get_collection(RawParams::from_query(query)) {
        Ok(output) => panic!("{query} should fail, got {}", output.to_json()),
        Err(err) => err,
    }
}

// ===== Collection mode =====

#[test]
fn test_filtered_sorted_window() {
    let output = query("status=active&_sort=-created&_start=0&_limit=2");
    assert_eq!(output["total"], json!(5));
    assert_eq!(output["count"], json!(2));
    assert_eq!(titles(&output), vec!["refactor", "write tests"]);
}

#[test]
fn test_default_limit_is_one() {
    let output = query("status=active&_sort=created");
    assert_eq!(output["total"], json!(5));
    assert_eq!(titles(&output), vec!["write docs"]);
}

#[test]
fn test_configured_default_limit() {
    let resource = resource().with_config(QueryConfig::with_default_limit(3));
    let output = resource
        .get_collection(RawParams::from_query("_sort=created"))
        .unwrap()
        .to_json();
    assert_eq!(output["count"], json!(3));
}

#[test]
fn test_page_window() {
    let output = query("_page=1&_limit=2&_sort=created");
    assert_eq!(output["total"], json!(7));
    assert_eq!(titles(&output), vec!["review pr", "deploy"]);
}

#[test]
fn test_unbounded_limit() {
    let output = query("_limit=-1&_start=5&_sort=created");
    assert_eq!(titles(&output), vec!["plan sprint", "refactor"]);
}

#[test]
fn test_start_and_page_conflict() {
    let err = query_err("_start=1&_page=1");
    assert_eq!(err.user_message(), "Can not specify _start and _page at the same time");
}

#[test]
fn test_identical_plans_order_identically() {
    let first = query("_sort=priority&_limit=-1");
    let second = query("_sort=priority&_limit=-1");
    assert_eq!(first.to_string(), second.to_string());
}

// ===== Predicates =====

#[test]
fn test_operators() {
    for (params, expected) in [
        ("priority__gte=3&_count", 2),
        ("priority__in=1,3&_count", 4),
        ("region__nin=north,south&_count", 2),
        ("title__istartswith=WRITE&_count", 2),
        ("title__contains=e%20t&_count", 1),
        ("status__ne=active&_count", 2),
        ("tags__size=2&_count", 1),
        ("tags__all=code,review&_count", 1),
        ("note__exists=0&_count", 7),
        ("priority__gt=1&priority__lt=3&_count", 3),
    ] {
        assert_eq!(query(params), json!(expected), "{params}");
    }
}

#[test]
fn test_empty_list_predicate() {
    let output = query("tags__empty=1&_sort=created&_limit=-1");
    assert_eq!(titles(&output), vec!["fix login", "write tests"]);
    assert_eq!(query("tags__empty=0&_count"), json!(5));
}

#[test]
fn test_nested_paths() {
    assert_eq!(query("address.city=Oslo&_count"), json!(3));

    let mut params = RawParams::from_json(json!({"address": {"city": "Bergen"}})).unwrap();
    params.insert("_count", "");
    let output = resource().get_collection(params).unwrap();
    assert_eq!(output.to_json(), json!(2));
}

#[test]
fn test_bad_integer_value() {
    let err = query_err("priority=high&_count");
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.user_message(), "Bad value for 'priority': `high`");
}

// ===== Projection =====

#[test]
fn test_only_fields_keep_identity() {
    let output = query("_fields=title,priority&_sort=created&_limit=1");
    assert_eq!(output["data"][0], json!({"id": 1, "title": "write docs", "priority": 2}));
}

#[test]
fn test_nested_field_and_rename() {
    let output = query("_fields=title__as__name,address.city&_sort=created&_limit=1");
    assert_eq!(
        output["data"][0],
        json!({"id": 1, "name": "write docs", "address": {"city": "Oslo"}})
    );
}

#[test]
fn test_exclude_fields() {
    let output = query("_fields=-address,-tags,-amount,-region&_sort=created&_limit=1");
    assert_eq!(
        output["data"][0],
        json!({"id": 1, "title": "write docs", "status": "active", "priority": 2, "created": 1})
    );
}

#[test]
fn test_mixed_fields_rejected() {
    let err = query_err("_fields=title,-tags");
    assert_eq!(
        err.user_message(),
        "Can only supply either positive or negative keys, but not both"
    );
}

#[test]
fn test_scalar_values() {
    assert_eq!(
        query("_scalar=title&_sort=created&_limit=2"),
        json!(["write docs", "fix login"])
    );
    assert_eq!(
        query("_scalar=title,priority&_sort=created&_limit=2"),
        json!([["write docs", 2], ["fix login", 1]])
    );
}

// ===== Single record =====

#[test]
fn test_first_mode() {
    assert_eq!(query("_first&_sort=-created")["title"], json!("refactor"));
    let err = query_err("_first&title=nothing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_count_takes_precedence_over_collection() {
    assert_eq!(query("status=done&_count&_limit=1"), json!(2));
}

// ===== Aggregation =====

#[test]
fn test_group_with_accumulator() {
    let output = query("status=active&_group=region&_group$sum=amount&_sort=region&_limit=-1");
    assert_eq!(
        output,
        json!([
            {"count": 1, "region": "east", "amount_sum": 4.0},
            {"count": 3, "region": "north", "amount_sum": 20.0},
            {"count": 1, "region": "south", "amount_sum": 5.0},
        ])
    );
}

#[test]
fn test_group_defaults_to_count_descending() {
    let output = query("status=active&_group=region&_limit=1");
    assert_eq!(output, json!([{"count": 3, "region": "north"}]));
}

#[test]
fn test_group_on_dotted_key_sorts() {
    let ascending = query("_group=address.city&_sort=address.city&_limit=-1");
    let descending = query("_group=address.city&_sort=-address.city&_limit=-1");
    assert_eq!(
        ascending,
        json!([
            {"count": 2, "address": {"city": "Bergen"}},
            {"count": 3, "address": {"city": "Oslo"}},
            {"count": 2, "address": {"city": "Trondheim"}},
        ])
    );
    assert_ne!(ascending, descending);
    assert_eq!(descending[0]["address"]["city"], json!("Trondheim"));
}

#[test]
fn test_group_count() {
    assert_eq!(query("_group=region&_count"), json!(3));
}

#[test]
fn test_group_multiple_accumulators() {
    let output = query("region=north&_group=status&_group$max=priority&_group$list=title&_limit=-1");
    assert_eq!(
        output,
        json!([{
            "count": 3,
            "status": "active",
            "priority_max": 3,
            "title_list": ["write docs", "review pr", "write tests"],
        }])
    );
}

#[test]
fn test_distinct_sorted() {
    assert_eq!(
        query("_distinct=region&_sort=-region&_limit=-1"),
        json!(["south", "north", "east"])
    );
    assert_eq!(query("status=active&_distinct=region&_count"), json!(3));
}

#[test]
fn test_distinct_rejects_other_sort() {
    let err = query_err("_distinct=status&_sort=status,other");
    assert_eq!(err.user_message(), "Must sort only on distinct");
}

#[test]
fn test_frequencies() {
    assert_eq!(
        query("_frequencies=status&_limit=-1"),
        json!([{"active": 5}, {"done": 2}])
    );
    assert_eq!(
        query("_frequencies=status&_sort=status&_limit=-1"),
        json!([{"done": 2}, {"active": 5}])
    );
    assert_eq!(
        query("region=north&_frequencies=status&_fq_normalize=1&_limit=-1"),
        json!([{"active": 1.0}])
    );
}

#[test]
fn test_frequencies_window() {
    assert_eq!(query("_frequencies=status"), json!([{"active": 5}]));
    assert_eq!(query("_frequencies=status&_start=1&_limit=-1"), json!([{"done": 2}]));
}

// ===== Resource operations =====

#[test]
fn test_get_and_get_resource() {
    let resource = resource();
    let record = resource.get(RawParams::from_query("title=deploy")).unwrap();
    assert_eq!(record.map(|r| r["status"].clone()), Some(json!("done")));

    assert!(resource.get(RawParams::from_query("title=none")).unwrap().is_none());
    let err = resource
        .get_resource(RawParams::from_query("title=none"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        err.user_message(),
        r#"'Task({"title":"none"})' resource not found"#
    );
}

#[test]
fn test_get_by_ids() {
    let output = resource()
        .get_by_ids(&[json!(1), json!(3)], RawParams::from_query("_sort=created"))
        .unwrap()
        .to_json();
    assert_eq!(output["count"], json!(2));
    assert_eq!(titles(&output), vec!["write docs", "review pr"]);
}

#[test]
fn test_get_or_create() {
    let resource = resource();
    let mut defaults = Map::new();
    defaults.insert("priority".to_string(), json!(9));

    let (created, was_created) = resource
        .get_or_create(RawParams::from_query("title=triage&status=new"), defaults.clone())
        .unwrap();
    assert!(was_created);
    assert_eq!(created["title"], json!("triage"));
    assert_eq!(created["priority"], json!(9));

    let (found, was_created) = resource
        .get_or_create(RawParams::from_query("title=triage"), defaults)
        .unwrap();
    assert!(!was_created);
    assert_eq!(found["id"], created["id"]);
}

#[test]
fn test_get_or_create_ambiguous() {
    let err = resource()
        .get_or_create(RawParams::from_query("status=active"), Map::new())
        .unwrap_err();
    assert_eq!(err.user_message(), "Bad or Insufficient Params");
}

#[test]
fn test_duplicate_insert_is_conflict() {
    let resource = resource();
    let err = resource
        .collection()
        .insert(json!({"title": "deploy"}))
        .unwrap_err();
    let err = ApiError::from(err);
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.user_message(), "Resource already exists.");
}

#[test]
fn test_to_distincts() {
    let distincts = resource().to_distincts(&["region", "status"], false).unwrap();
    assert_eq!(
        Value::Object(distincts),
        json!({"region": ["east", "north", "south"], "status": ["active", "done"]})
    );
}
