//! Admission webhook core
//!
//! Routes each AdmissionReview through an ordered dispatch table to the
//! application's decision hooks and builds the response:
//! - `dispatch`: rule table and classification
//! - `handler`: the hooks an application implements
//! - `response`: allow/deny/JSON Patch builders
//! - `server`: axum router and listener

pub mod dispatch;
pub mod handler;
pub mod response;
mod server;

pub use dispatch::{
    Action, DispatchError, DispatchRule, Dispatcher, classify, default_rules, select_hook,
};
pub use handler::{AdmissionHandler, AllowAll, HandlerError, Hook, HookResult};
pub use response::{
    AdmissionReviewResponse, EncodedPatch, PatchError, PatchType, ReviewResponse, allow, deny,
    deny_with_reason, patch, patch_with_exception, patch_with_status,
};
pub use server::{WebhookError, WebhookState, create_webhook_router, run_webhook_server};
