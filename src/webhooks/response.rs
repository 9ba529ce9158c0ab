//! AdmissionReview response builders
//!
//! Every builder copies `uid` from the request. The API server matches
//! responses to requests by uid and fails the whole admission call on a
//! mismatch.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::handler::HandlerError;
use crate::review::path::json_type_name;
use crate::review::{ADMISSION_REVIEW_KIND, ReviewRequest};

/// Errors building or decoding a JSON Patch response
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("JSON patch serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Patch is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Cannot inject status into {0}, expected an object")]
    NotAMapping(&'static str),
}

/// Only JSON Patch is accepted by the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

/// Base64-encoded RFC 6902 document together with its type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPatch {
    pub patch: String,
    pub patch_type: PatchType,
}

impl EncodedPatch {
    pub fn encode(patch: &json_patch::Patch) -> Result<Self, PatchError> {
        let document = serde_json::to_vec(patch)?;
        Ok(Self {
            patch: STANDARD.encode(document),
            patch_type: PatchType::JsonPatch,
        })
    }

    pub fn decode(&self) -> Result<json_patch::Patch, PatchError> {
        let document = STANDARD.decode(&self.patch)?;
        Ok(serde_json::from_slice(&document)?)
    }
}

/// The `response` half of an AdmissionReview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(flatten)]
    pub patch: Option<EncodedPatch>,
}

/// Outbound AdmissionReview envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: ReviewResponse,
}

impl AdmissionReviewResponse {
    pub fn new(api_version: impl Into<String>, response: ReviewResponse) -> Self {
        Self {
            api_version: api_version.into(),
            kind: ADMISSION_REVIEW_KIND.to_string(),
            response,
        }
    }

    /// Wrap `response` in an envelope matching the request's apiVersion
    pub fn for_request(request: &ReviewRequest, response: ReviewResponse) -> Self {
        Self::new(request.api_version(), response)
    }
}

fn respond(request: &ReviewRequest, allowed: bool, status: Option<Value>) -> ReviewResponse {
    ReviewResponse {
        uid: request.uid().to_string(),
        allowed,
        status,
        patch: None,
    }
}

/// Allow the request, optionally with a message
pub fn allow(request: &ReviewRequest, message: Option<String>) -> ReviewResponse {
    respond(request, true, message.map(Value::String))
}

/// Deny the request with a message visible to the requesting user
pub fn deny(request: &ReviewRequest, message: impl Into<String>) -> ReviewResponse {
    respond(request, false, Some(Value::String(message.into())))
}

/// Deny with a Kubernetes-style `Status` object
pub fn deny_with_reason(
    request: &ReviewRequest,
    code: u16,
    reason: &str,
    message: &str,
) -> ReviewResponse {
    respond(
        request,
        false,
        Some(json!({
            "code": code,
            "reason": reason,
            "message": message,
        })),
    )
}

/// Respond with a JSON Patch turning `request.object` into `new_object`.
///
/// A missing object (DELETE) diffs from `null`.
pub fn patch(
    request: &ReviewRequest,
    new_object: &Value,
    allowed: bool,
) -> Result<ReviewResponse, PatchError> {
    let current = request.object().unwrap_or(&Value::Null);
    let diff = json_patch::diff(current, new_object);

    Ok(ReviewResponse {
        patch: Some(EncodedPatch::encode(&diff)?),
        ..respond(request, allowed, None)
    })
}

/// Patch a `status` sub-object into a copy of `request.object`
pub fn patch_with_status(
    request: &ReviewRequest,
    code: u16,
    message: &str,
    error: Option<Value>,
    allowed: bool,
) -> Result<ReviewResponse, PatchError> {
    let mut new_object = request.object().cloned().unwrap_or(Value::Null);
    let found = json_type_name(&new_object);
    let Value::Object(fields) = &mut new_object else {
        return Err(PatchError::NotAMapping(found));
    };

    let mut status = serde_json::Map::new();
    status.insert("code".to_string(), json!(code));
    if let Some(error) = error {
        status.insert("error".to_string(), error);
    }
    status.insert("message".to_string(), json!(message));
    fields.insert("status".to_string(), Value::Object(status));

    patch(request, &new_object, allowed)
}

/// Embed a hook failure into the object's `status`.
///
/// Callers usually pass `code = 500`.
pub fn patch_with_exception(
    request: &ReviewRequest,
    error: &HandlerError,
    code: u16,
    allowed: bool,
) -> Result<ReviewResponse, PatchError> {
    let message = error.to_string();
    let detail = json!({
        "type": error.kind(),
        "message": message,
    });
    patch_with_status(request, code, &message, Some(detail), allowed)
}
