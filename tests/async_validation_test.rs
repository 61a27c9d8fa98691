//! Integration tests for async tests and dependency-gated revalidation
//!
//! Async tests are driven by a `LocalPool`, so each test decides exactly
//! when pending checks settle.

use formguard::async_test::AsyncTest;
use formguard::{
    string, ClassSchema, Declaration, Engine, Level, StatusMap, TestError, TestResult,
    ValidationSettings, Value,
};
use futures::executor::{block_on, LocalPool};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ============================================================================
// Test Helper Functions
// ============================================================================

/// Async test rejecting `"taken"`, counting its invocations.
fn availability(calls: &Rc<Cell<usize>>) -> AsyncTest {
    let calls = Rc::clone(calls);
    AsyncTest::new(move |ctx| {
        calls.set(calls.get() + 1);
        let free = ctx.value().as_str() != Some("taken");
        async move { Ok(TestResult::from(free)) }
    })
}

fn run(engine: &Engine, schema: &dyn Declaration, value: serde_json::Value) -> StatusMap {
    engine.validate_all(schema, &Value::from(value), &ValidationSettings::new())
}

// ============================================================================
// Pending → settled cycle
// ============================================================================

#[test]
fn test_pending_then_settled_valid() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema = string().test_async(availability(&calls));

    let statuses = run(&engine, &schema, json!("free"));
    assert_eq!(statuses.len(), 1);
    let pending = &statuses[""];
    assert_eq!(pending.level, Level::Pending);
    assert_eq!(pending.code, "test");
    assert_eq!(pending.message, "Pending...");
    assert!(pending.pending().is_some());
    assert!(engine.async_status("").is_some_and(|s| s.is_pending()));

    pool.run_until_stalled();
    assert_eq!(engine.async_status(""), None);

    let statuses = run(&engine, &schema, json!("free"));
    assert!(statuses.is_empty());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_settled_invalid_is_reused() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema = string().test_async(availability(&calls).pending_message("Checking..."));

    let statuses = run(&engine, &schema, json!("taken"));
    assert_eq!(statuses[""].message, "Checking...");
    pool.run_until_stalled();

    let settled = engine.async_status("").unwrap();
    assert_eq!(settled.level, Level::Error);
    assert_eq!(settled.message, "Invalid value");

    let statuses = run(&engine, &schema, json!("taken"));
    assert_eq!(statuses[""].level, Level::Error);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_pending_handle_resolves_to_settled_status() {
    let engine = Engine::new();
    let schema = string().test_async(AsyncTest::new(|_| async {
        Ok(TestResult::from(("Already used", Level::Warning)))
    }));
    let statuses = run(&engine, &schema, json!("x"));
    let handle = statuses[""].pending().unwrap().clone();

    let settled = block_on(handle).unwrap();
    assert_eq!(settled.level, Level::Warning);
    assert_eq!(settled.message, "Already used");
    assert_eq!(engine.async_status(""), Some(settled));
}

#[test]
fn test_sync_checks_run_before_async_test() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema = string().min(3).test_async(availability(&calls));

    let statuses = run(&engine, &schema, json!("ab"));
    assert_eq!(statuses[""].code, "min");
    pool.run_until_stalled();
    assert_eq!(calls.get(), 0);
}

// ============================================================================
// Dependency-gated revalidation
// ============================================================================

fn account(calls: &Rc<Cell<usize>>) -> Rc<ClassSchema> {
    let username = string().test_async(availability(calls).dependencies(|ctx| {
        let domain = ctx
            .parent()
            .and_then(|parent| parent.get("domain"))
            .cloned()
            .unwrap_or_default();
        Value::Array(vec![ctx.value().clone(), domain])
    }));
    ClassSchema::builder("Account")
        .field("username", username)
        .field("domain", string())
        .build()
}

#[test]
fn test_revalidates_only_when_dependencies_change() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema = account(&calls);

    let mut step = |value: serde_json::Value| {
        let statuses = run(&engine, &schema, value);
        pool.run_until_stalled();
        statuses
    };

    step(json!({ "username": "bob", "domain": "a" }));
    assert_eq!(calls.get(), 1);

    step(json!({ "username": "bob", "domain": "a" }));
    assert_eq!(calls.get(), 1);

    step(json!({ "username": "bob", "domain": "b" }));
    assert_eq!(calls.get(), 2);

    step(json!({ "username": "alice", "domain": "b" }));
    assert_eq!(calls.get(), 3);

    let statuses = step(json!({ "username": "alice", "domain": "b" }));
    assert_eq!(calls.get(), 3);
    assert!(statuses.is_empty());
}

#[test]
fn test_stale_settlement_does_not_mask_newer_run() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema = account(&calls);

    // Two passes before anything settles: the second one restarts the test.
    run(&engine, &schema, json!({ "username": "taken", "domain": "a" }));
    run(&engine, &schema, json!({ "username": "bob", "domain": "a" }));
    assert_eq!(calls.get(), 2);

    pool.run_until_stalled();
    assert_eq!(engine.async_status("username"), None);

    let statuses = run(&engine, &schema, json!({ "username": "bob", "domain": "a" }));
    assert!(statuses.is_empty());
    assert_eq!(calls.get(), 2);

    let statuses = run(&engine, &schema, json!({ "username": "taken", "domain": "a" }));
    assert_eq!(calls.get(), 3);
    assert_eq!(statuses["username"].level, Level::Pending);
}

#[test]
fn test_pending_status_is_reused_while_in_flight() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema = string().test_async(availability(&calls));

    let first = run(&engine, &schema, json!("x"));
    let second = run(&engine, &schema, json!("x"));
    assert_eq!(calls.get(), 1);
    assert_eq!(second[""].level, Level::Pending);
    assert_eq!(first[""].pending(), second[""].pending());
    pool.run_until_stalled();
}

#[test]
fn test_custom_should_revalidate() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let schema =
        string().test_async(availability(&calls).should_revalidate(|_, _, _| true));

    for _ in 0..3 {
        run(&engine, &schema, json!("same"));
        pool.run_until_stalled();
    }
    assert_eq!(calls.get(), 3);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_rejection_is_unavailable_and_not_retried() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let schema = string().test_async(AsyncTest::new(move |_| {
        counter.set(counter.get() + 1);
        async { Err(TestError::new("service down")) }
    }));

    run(&engine, &schema, json!("a"));
    pool.run_until_stalled();
    let status = engine.async_status("").unwrap();
    assert_eq!(status.level, Level::Unavailable);
    assert_eq!(status.message, "service down");

    // A changed value does not retry an unavailable check.
    let statuses = run(&engine, &schema, json!("b"));
    assert_eq!(statuses[""].level, Level::Unavailable);
    assert_eq!(calls.get(), 1);

    engine.clear_async();
    run(&engine, &schema, json!("b"));
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_empty_rejection_uses_unavailable_message() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let schema = string().test_async(
        AsyncTest::new(|_| async { Err(TestError::new("")) }).unavailable_message("Try again later"),
    );
    run(&engine, &schema, json!("a"));
    pool.run_until_stalled();
    assert_eq!(engine.async_status("").unwrap().message, "Try again later");
}

// ============================================================================
// Settings and hooks
// ============================================================================

#[test]
fn test_skip_async_treats_tests_as_valid() {
    let engine = Engine::new();
    let calls = Rc::new(Cell::new(0));
    let schema = string().test_async(availability(&calls));
    let settings = ValidationSettings::new().skip_async(true);

    let statuses = engine.validate_all(&schema, &Value::from("taken"), &settings);
    assert!(statuses.is_empty());
    assert_eq!(calls.get(), 0);
    assert_eq!(engine.async_status(""), None);
}

#[test]
fn test_on_settle_reports_paths() {
    let mut pool = LocalPool::new();
    let settled = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&settled);
    let engine = Engine::new()
        .with_spawner(pool.spawner())
        .on_settle(move |path| log.borrow_mut().push(path.to_string()));
    let calls = Rc::new(Cell::new(0));
    let schema = account(&calls);

    run(&engine, &schema, json!({ "username": "bob" }));
    assert!(settled.borrow().is_empty());
    pool.run_until_stalled();
    assert_eq!(*settled.borrow(), vec!["username".to_string()]);
}

#[test]
fn test_class_level_async_test() {
    let mut pool = LocalPool::new();
    let engine = Engine::new().with_spawner(pool.spawner());
    let schema = ClassSchema::builder("Booking")
        .field("room", string().required(true))
        .test_async(AsyncTest::new(|ctx| {
            let room = ctx.value().get("room").and_then(Value::as_str).map(str::to_owned);
            async move {
                Ok(match room.as_deref() {
                    Some("101") => TestResult::message("Room already booked"),
                    _ => TestResult::Valid,
                })
            }
        }))
        .build();

    let statuses = run(&engine, &schema, json!({}));
    assert_eq!(statuses["room"].code, "required");
    assert!(!statuses.contains_key(""));

    run(&engine, &schema, json!({ "room": "101" }));
    pool.run_until_stalled();
    assert_eq!(engine.async_status("").unwrap().message, "Room already booked");
}
