//! Unit tests for kube-admission
//!
//! These exercise the public API without a cluster or a network listener.
//! Routers are driven in-process with `tower::ServiceExt::oneshot`.

#[path = "../common/mod.rs"]
mod common;

mod dispatch;
mod health;
