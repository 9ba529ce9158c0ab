//! Decision hooks supplied by the embedding application
//!
//! The dispatch engine selects one hook per review and calls it; it owns none
//! of the decision logic. `on_create`, `on_update` and `on_delete` must be
//! provided. The remaining hooks have defaults that allow dry runs and
//! unmatched reviews and deny on hook failure.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use super::response::{PatchError, ReviewResponse, deny};
use crate::review::ReviewRequest;

/// Result of a decision hook. `Ok(None)` means "allow with defaults".
pub type HookResult = Result<Option<ReviewResponse>, HandlerError>;

/// Contract methods a dispatch rule can route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Create,
    Update,
    Delete,
    DryRun,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Create => "on_create",
            Hook::Update => "on_update",
            Hook::Delete => "on_delete",
            Hook::DryRun => "on_dry_run",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by decision hooks
///
/// The category returned by [`HandlerError::kind`] is what reaches the
/// requesting user through the default `on_exception` deny.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    Patch(#[from] PatchError),

    #[error("{0} is not implemented")]
    NotImplemented(Hook),

    #[error("{0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("hook panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Create an execution error from a message
    pub fn execution(message: impl Into<String>) -> Self {
        HandlerError::Execution(message.into())
    }

    /// Wrap any error raised while running a hook
    pub fn from_source<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandlerError::Source(Box::new(error))
    }

    /// Error category
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::Execution(_) | HandlerError::Source(_) | HandlerError::Panicked(_) => {
                "HandlerExecutionError"
            }
            HandlerError::Patch(_) => "PatchConstructionError",
            HandlerError::NotImplemented(_) => "NotImplemented",
        }
    }
}

/// Decision hooks for one admission webhook
///
/// Implementations are shared across concurrent reviews and must not rely on
/// per-request mutable state. Hooks may suspend (e.g. to consult an external
/// policy service); only the selected hook for a review is awaited.
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    async fn on_create(&self, request: &ReviewRequest) -> HookResult;

    async fn on_update(&self, request: &ReviewRequest) -> HookResult;

    async fn on_delete(&self, request: &ReviewRequest) -> HookResult;

    /// Called for dry-run reviews. Handlers with side effects must not
    /// persist them here.
    async fn on_dry_run(&self, request: &ReviewRequest) -> HookResult {
        debug!(uid = %request.uid(), "dry run");
        Ok(None)
    }

    /// Called when no dispatch rule selected a hook
    async fn on_miss_match(&self, request: &ReviewRequest) -> HookResult {
        debug!(uid = %request.uid(), "no dispatch rule matched");
        Ok(None)
    }

    /// Turn a hook failure into the final response. Must not fail.
    ///
    /// The default denies with `"<kind>: <message>"`. Override to redact
    /// details before they reach the requesting user.
    async fn on_exception(&self, request: &ReviewRequest, error: &HandlerError) -> ReviewResponse {
        deny(request, format!("{}: {}", error.kind(), error))
    }

    /// Call the hook named by `hook`
    async fn invoke(&self, hook: Hook, request: &ReviewRequest) -> HookResult {
        match hook {
            Hook::Create => self.on_create(request).await,
            Hook::Update => self.on_update(request).await,
            Hook::Delete => self.on_delete(request).await,
            Hook::DryRun => self.on_dry_run(request).await,
        }
    }
}

/// Allows every review
///
/// Used by the bundled binary until an application supplies its own hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AdmissionHandler for AllowAll {
    async fn on_create(&self, request: &ReviewRequest) -> HookResult {
        info!(uid = %request.uid(), name = ?request.name(), "allowing create");
        Ok(None)
    }

    async fn on_update(&self, request: &ReviewRequest) -> HookResult {
        info!(uid = %request.uid(), name = ?request.name(), "allowing update");
        Ok(None)
    }

    async fn on_delete(&self, request: &ReviewRequest) -> HookResult {
        info!(uid = %request.uid(), name = ?request.name(), "allowing delete");
        Ok(None)
    }
}
