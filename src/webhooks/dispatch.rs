//! Rule-ordered dispatch of admission reviews to decision hooks
//!
//! A rule resolves one field of the request (the discriminant) and maps its
//! value to an [`Action`]. Rules are evaluated in declaration order and the
//! first rule that invokes a hook or fails ends classification. When every
//! rule is ignored the handler's `on_miss_match` hook runs instead.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::handler::{AdmissionHandler, HandlerError, Hook, HookResult};
use super::response::{ReviewResponse, allow};
use crate::review::{KeyPath, PathError, Resolved, ReviewRequest};

/// What a rule does with a discriminant value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Skip this rule and evaluate the next one
    Ignore,
    /// Abort classification with [`DispatchError::NoMatchingHandler`]
    Fail,
    /// Call the hook and stop evaluating rules
    Invoke(Hook),
}

/// Errors that end classification without a hook response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no handler for value {value} at '{key_path}'")]
    NoMatchingHandler { key_path: String, value: String },

    #[error("cannot resolve '{key_path}': {source}")]
    Path {
        key_path: String,
        #[source]
        source: PathError,
    },
}

impl DispatchError {
    /// Error category, as reported to the requesting user
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoMatchingHandler { .. } => "NoMatchingHandler",
            DispatchError::Path { .. } => "PathResolutionError",
        }
    }
}

/// One entry of the dispatch table
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRule {
    key_path: KeyPath,
    handlers: Vec<(Value, Action)>,
    default_action: Action,
}

impl DispatchRule {
    pub fn new(key_path: KeyPath, default_action: Action) -> Self {
        Self {
            key_path,
            handlers: Vec::new(),
            default_action,
        }
    }

    /// Create a rule from a dot-separated key path
    pub fn parse(key_path: &str, default_action: Action) -> Result<Self, PathError> {
        Ok(Self::new(KeyPath::parse(key_path)?, default_action))
    }

    /// Map a discriminant value to an action. Later entries for the same
    /// value are shadowed by earlier ones.
    pub fn on(mut self, value: impl Into<Value>, action: Action) -> Self {
        self.handlers.push((value.into(), action));
        self
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    pub fn handlers(&self) -> &[(Value, Action)] {
        &self.handlers
    }

    pub fn default_action(&self) -> Action {
        self.default_action
    }

    /// Action mapped to a resolved discriminant, if any. An explicit null
    /// matches a `null` entry; an absent value never matches.
    pub fn lookup(&self, resolved: &Resolved<'_>) -> Option<Action> {
        if resolved.is_absent() {
            return None;
        }
        let value = resolved.value();
        self.handlers
            .iter()
            .find(|(candidate, _)| match value {
                Some(value) => candidate == value,
                None => candidate.is_null(),
            })
            .map(|(_, action)| *action)
    }

    pub fn action_for(&self, resolved: &Resolved<'_>) -> Action {
        self.lookup(resolved).unwrap_or(self.default_action)
    }
}

/// The standard table:
/// 1. `dryRun`: `true` invokes `on_dry_run`; `false` or absent continues.
/// 2. `options.kind`: routes Create/Update/DeleteOptions to their hooks and
///    fails on anything else.
pub fn default_rules() -> Vec<DispatchRule> {
    vec![
        DispatchRule::new(KeyPath::from_segments(["dryRun"]), Action::Ignore)
            .on(true, Action::Invoke(Hook::DryRun))
            .on(false, Action::Ignore),
        DispatchRule::new(KeyPath::from_segments(["options", "kind"]), Action::Fail)
            .on("CreateOptions", Action::Invoke(Hook::Create))
            .on("UpdateOptions", Action::Invoke(Hook::Update))
            .on("DeleteOptions", Action::Invoke(Hook::Delete)),
    ]
}

/// Walk `rules` and pick the hook to call.
///
/// Returns `Ok(None)` when every rule was ignored.
pub fn select_hook(
    request: &ReviewRequest,
    rules: &[DispatchRule],
) -> Result<Option<Hook>, DispatchError> {
    for rule in rules {
        let resolved = request
            .resolve(rule.key_path())
            .map_err(|source| DispatchError::Path {
                key_path: rule.key_path().to_string(),
                source,
            })?;

        let action = match rule.lookup(&resolved) {
            Some(action) => action,
            None => {
                if resolved.is_absent() {
                    warn!(
                        uid = %request.uid(),
                        key_path = %rule.key_path(),
                        "Discriminant absent from request, using default action"
                    );
                } else {
                    debug!(
                        uid = %request.uid(),
                        key_path = %rule.key_path(),
                        value = %resolved,
                        "Discriminant value not mapped, using default action"
                    );
                }
                rule.default_action()
            }
        };

        match action {
            Action::Ignore => continue,
            Action::Fail => {
                return Err(DispatchError::NoMatchingHandler {
                    key_path: rule.key_path().to_string(),
                    value: resolved.to_string(),
                });
            }
            Action::Invoke(hook) => return Ok(Some(hook)),
        }
    }

    Ok(None)
}

/// Classify `request` and produce the hook's response.
///
/// A hook returning `None` yields a default allow. A hook error or panic is
/// handed to `on_exception`, whose response is returned as-is. Only table-level
/// failures (an unmapped discriminant under `Fail`, a path type mismatch)
/// come back as `Err`.
pub async fn classify(
    request: &ReviewRequest,
    rules: &[DispatchRule],
    handler: &dyn AdmissionHandler,
) -> Result<ReviewResponse, DispatchError> {
    let selected = select_hook(request, rules)?;
    let call = async {
        match selected {
            Some(hook) => {
                debug!(uid = %request.uid(), hook = %hook, "Invoking admission hook");
                handler.invoke(hook, request).await
            }
            None => handler.on_miss_match(request).await,
        }
    };
    let result: HookResult = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    };

    let mut response = match result {
        Ok(Some(response)) => response,
        Ok(None) => allow(request, None),
        Err(e) => {
            warn!(uid = %request.uid(), kind = e.kind(), error = %e, "Admission hook failed");
            handler.on_exception(request, &e).await
        }
    };

    if response.uid != request.uid() {
        warn!(
            uid = %request.uid(),
            response_uid = %response.uid,
            "Hook returned a response for a different uid, restoring request uid"
        );
        response.uid = request.uid().to_string();
    }

    Ok(response)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "hook panicked".to_string()
    }
}

/// Dispatch table and handler shared by all concurrent reviews
#[derive(Clone)]
pub struct Dispatcher {
    rules: Arc<[DispatchRule]>,
    handler: Arc<dyn AdmissionHandler>,
}

impl Dispatcher {
    /// Dispatcher using [`default_rules`]
    pub fn new(handler: Arc<dyn AdmissionHandler>) -> Self {
        Self::with_rules(handler, default_rules())
    }

    pub fn with_rules(handler: Arc<dyn AdmissionHandler>, rules: Vec<DispatchRule>) -> Self {
        Self {
            rules: rules.into(),
            handler,
        }
    }

    pub fn rules(&self) -> &[DispatchRule] {
        &self.rules
    }

    pub async fn dispatch(&self, request: &ReviewRequest) -> Result<ReviewResponse, DispatchError> {
        classify(request, &self.rules, self.handler.as_ref()).await
    }
}
