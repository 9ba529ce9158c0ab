//! Kubernetes admission webhook core
//!
//! Parses AdmissionReview requests, classifies them with an ordered rule
//! table, calls the matching [`AdmissionHandler`] hook and returns a
//! well-formed AdmissionReview response (allow, deny or JSON Patch).

pub mod config;
pub mod health;
pub mod review;
pub mod webhooks;

pub use config::{ConfigError, WebhookConfig};
pub use health::{HealthState, Metrics};
pub use review::{KeyPath, Operation, Resolved, ReviewError, ReviewRequest};
pub use webhooks::{
    Action, AdmissionHandler, AdmissionReviewResponse, AllowAll, DispatchError, DispatchRule,
    Dispatcher, HandlerError, Hook, HookResult, ReviewResponse, WebhookError, run_webhook_server,
};
