//! Classification scenarios against the default dispatch table

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;

use async_trait::async_trait;
use kube_admission::webhooks::{
    Action, DispatchError, DispatchRule, Dispatcher, HandlerError, Hook, HookResult, deny,
};
use kube_admission::{AdmissionHandler, KeyPath, ReviewRequest, ReviewResponse};
use serde_json::{Value, json};

use crate::common::*;

#[tokio::test]
async fn test_create_with_patch_returns_patch_response() {
    let object = json!({"metadata": {"name": "web"}, "spec": {"replicas": 1}});
    let mut desired = object.clone();
    desired["metadata"]["labels"] = json!({"injected": "true"});

    let handler = Arc::new(RecordingHandler::patching_create(desired.clone()));
    let dispatcher = Dispatcher::new(handler.clone());
    let review = create_review("uid-a", Some("CreateOptions"), object.clone());
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(handler.calls(), vec!["on_create"]);
    assert_eq!(response.uid, "uid-a");
    assert!(response.allowed);

    let patch = response.patch.unwrap().decode().unwrap();
    let mut doc = object;
    json_patch::patch(&mut doc, &patch.0).unwrap();
    assert_eq!(doc, desired);
}

#[tokio::test]
async fn test_update_hook_error_is_denied_via_on_exception() {
    let handler = Arc::new(RecordingHandler::failing_update("replicas must be odd"));
    let dispatcher = Dispatcher::new(handler.clone());
    let review = create_review("uid-b", Some("UpdateOptions"), deployment(2));
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(handler.calls(), vec!["on_update"]);
    assert_eq!(response.uid, "uid-b");
    assert!(!response.allowed);
    assert_eq!(
        response.status,
        Some(json!("HandlerExecutionError: replicas must be odd"))
    );
    assert!(response.patch.is_none());
}

#[tokio::test]
async fn test_dry_run_never_calls_mutating_hooks() {
    for kind in [
        "CreateOptions",
        "UpdateOptions",
        "DeleteOptions",
        "ScaleOptions",
    ] {
        let handler = Arc::new(RecordingHandler::new());
        let dispatcher = Dispatcher::new(handler.clone());
        let request = parse(create_dry_run_review("uid-c", kind));

        let response = dispatcher.dispatch(&request).await.unwrap();

        assert_eq!(handler.calls(), vec!["on_dry_run"], "options.kind {}", kind);
        assert!(response.allowed);
        assert_eq!(response.uid, "uid-c");
    }
}

#[tokio::test]
async fn test_unmapped_options_kind_fails_without_calling_hooks() {
    let handler = Arc::new(RecordingHandler::new());
    let dispatcher = Dispatcher::new(handler.clone());
    let review = create_review("uid-d", Some("ConnectOptions"), json!({}));
    let request = parse(review);

    let err = dispatcher.dispatch(&request).await.unwrap_err();

    assert!(handler.calls().is_empty());
    assert_eq!(err.kind(), "NoMatchingHandler");
    assert!(matches!(
        err,
        DispatchError::NoMatchingHandler { ref key_path, ref value }
            if key_path == "options.kind" && value == "\"ConnectOptions\""
    ));
}

#[tokio::test]
async fn test_missing_options_fails() {
    let handler = Arc::new(RecordingHandler::new());
    let dispatcher = Dispatcher::new(handler.clone());
    let review = create_review("uid-e", None, json!({}));
    let request = parse(review);

    let err = dispatcher.dispatch(&request).await.unwrap_err();

    assert!(handler.calls().is_empty());
    assert_eq!(err.kind(), "NoMatchingHandler");
}

#[tokio::test]
async fn test_delete_routes_to_on_delete_and_allows() {
    let handler = Arc::new(RecordingHandler::new());
    let dispatcher = Dispatcher::new(handler.clone());
    let review = create_review("uid-f", Some("DeleteOptions"), Value::Null);
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(handler.calls(), vec!["on_delete"]);
    assert!(response.allowed);
    assert!(response.status.is_none());
}

#[tokio::test]
async fn test_all_rules_ignored_calls_on_miss_match() {
    let rules = vec![
        DispatchRule::new(KeyPath::from_segments(["operation"]), Action::Ignore)
            .on("DELETE", Action::Invoke(Hook::Delete)),
    ];
    let handler = Arc::new(RecordingHandler::new());
    let dispatcher = Dispatcher::with_rules(handler.clone(), rules);
    let review = create_review("uid-g", Some("CreateOptions"), json!({}));
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(handler.calls(), vec!["on_miss_match"]);
    assert!(response.allowed);
}

#[tokio::test]
async fn test_custom_rule_on_user_info() {
    let rules = vec![
        DispatchRule::parse("userInfo.username", Action::Ignore)
            .unwrap()
            .on("admin", Action::Invoke(Hook::Delete)),
    ];
    let handler = Arc::new(RecordingHandler::new());
    let dispatcher = Dispatcher::with_rules(handler.clone(), rules);
    let review = create_review("uid-h", Some("CreateOptions"), json!({}));
    let request = parse(review);

    dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(handler.calls(), vec!["on_delete"]);
}

/// Replaces hook error details with a generic message
struct Redacting;

#[async_trait]
impl AdmissionHandler for Redacting {
    async fn on_create(&self, _request: &ReviewRequest) -> HookResult {
        Err(HandlerError::execution("secret token abc123 rejected"))
    }

    async fn on_update(&self, _request: &ReviewRequest) -> HookResult {
        Ok(None)
    }

    async fn on_delete(&self, _request: &ReviewRequest) -> HookResult {
        Ok(None)
    }

    async fn on_exception(&self, request: &ReviewRequest, error: &HandlerError) -> ReviewResponse {
        deny(request, format!("{}: request rejected", error.kind()))
    }
}

#[tokio::test]
async fn test_on_exception_override_controls_message() {
    let dispatcher = Dispatcher::new(Arc::new(Redacting));
    let review = create_review("uid-i", Some("CreateOptions"), json!({}));
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert!(!response.allowed);
    assert_eq!(
        response.status,
        Some(json!("HandlerExecutionError: request rejected"))
    );
}

/// Answers with a response built for some other review
struct WrongUid;

#[async_trait]
impl AdmissionHandler for WrongUid {
    async fn on_create(&self, request: &ReviewRequest) -> HookResult {
        let mut response = deny(request, "nope");
        response.uid = "someone-else".to_string();
        Ok(Some(response))
    }

    async fn on_update(&self, _request: &ReviewRequest) -> HookResult {
        Ok(None)
    }

    async fn on_delete(&self, _request: &ReviewRequest) -> HookResult {
        Ok(None)
    }
}

#[tokio::test]
async fn test_response_uid_always_matches_request() {
    let dispatcher = Dispatcher::new(Arc::new(WrongUid));
    let review = create_review("uid-j", Some("CreateOptions"), json!({}));
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(response.uid, "uid-j");
    assert!(!response.allowed);
}

/// Indexes into a field that DELETE reviews do not carry
struct Panicking;

#[async_trait]
impl AdmissionHandler for Panicking {
    async fn on_create(&self, _request: &ReviewRequest) -> HookResult {
        Ok(None)
    }

    async fn on_update(&self, _request: &ReviewRequest) -> HookResult {
        Ok(None)
    }

    async fn on_delete(&self, request: &ReviewRequest) -> HookResult {
        let object = request.object().expect("object is set");
        Ok(Some(deny(request, object.to_string())))
    }
}

#[tokio::test]
async fn test_hook_panic_is_denied_via_on_exception() {
    let dispatcher = Dispatcher::new(Arc::new(Panicking));
    let review = create_review("uid-k", Some("DeleteOptions"), Value::Null);
    let request = parse(review);

    let response = dispatcher.dispatch(&request).await.unwrap();

    assert_eq!(response.uid, "uid-k");
    assert!(!response.allowed);
    assert_eq!(
        response.status,
        Some(json!("HandlerExecutionError: hook panicked: object is set"))
    );
}

#[tokio::test]
async fn test_dispatcher_is_shared_across_tasks() {
    let handler = Arc::new(RecordingHandler::new());
    let dispatcher = Dispatcher::new(handler.clone());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let uid = format!("uid-{}", i);
            let review = create_review(&uid, Some("DeleteOptions"), Value::Null);
            let request = parse(review);
            let response = dispatcher.dispatch(&request).await.unwrap();
            assert_eq!(response.uid, uid);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(handler.calls().len(), 8);
}
