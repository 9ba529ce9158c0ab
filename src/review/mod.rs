//! AdmissionReview request model
//!
//! Parses the envelope sent by the API server into a read-only
//! [`ReviewRequest`]. The raw request mapping is kept alongside the typed
//! fields so dispatch rules can address any field by [`KeyPath`].

pub mod path;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use path::{KeyPath, PathError, Resolved, resolve};

/// admission.k8s.io/v1
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
/// admission.k8s.io/v1beta1, still sent by older API servers
pub const ADMISSION_API_VERSION_V1BETA1: &str = "admission.k8s.io/v1beta1";
/// Envelope kind for both directions
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// Errors for reviews that cannot be answered because the envelope is unusable
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Invalid AdmissionReview JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Unsupported apiVersion '{0}'")]
    UnsupportedApiVersion(String),

    #[error("Unexpected kind '{0}', expected AdmissionReview")]
    UnexpectedKind(String),

    #[error("Missing request in AdmissionReview")]
    MissingRequest,

    #[error("Missing uid in AdmissionReview request")]
    MissingUid,

    #[error("Invalid field in AdmissionReview request: {0}")]
    InvalidField(#[source] serde_json::Error),
}

/// Operation being admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound AdmissionReview envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub request: Option<Value>,
}

/// Typed view of the request fields the core reads or passes through
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RequestFields {
    kind: Option<Value>,
    resource: Option<Value>,
    sub_resource: Option<String>,
    request_kind: Option<Value>,
    request_resource: Option<Value>,
    request_sub_resource: Option<String>,
    name: Option<String>,
    namespace: Option<String>,
    operation: Option<Operation>,
    user_info: Option<Value>,
    object: Option<Value>,
    old_object: Option<Value>,
    options: Option<Value>,
    dry_run: Option<bool>,
}

/// Immutable snapshot of one admission event
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    api_version: String,
    uid: String,
    kind: Option<Value>,
    resource: Option<Value>,
    sub_resource: Option<String>,
    request_kind: Option<Value>,
    request_resource: Option<Value>,
    request_sub_resource: Option<String>,
    name: Option<String>,
    namespace: Option<String>,
    operation: Option<Operation>,
    user_info: Option<Value>,
    object: Option<Value>,
    old_object: Option<Value>,
    options: Option<Value>,
    dry_run: Option<bool>,
    raw: Value,
}

impl ReviewRequest {
    /// Parse a request body
    pub fn from_slice(body: &[u8]) -> Result<Self, ReviewError> {
        let review: AdmissionReview =
            serde_json::from_slice(body).map_err(ReviewError::InvalidJson)?;
        Self::from_review(review)
    }

    /// Parse an already-decoded JSON envelope
    pub fn from_value(envelope: Value) -> Result<Self, ReviewError> {
        let review: AdmissionReview =
            serde_json::from_value(envelope).map_err(ReviewError::InvalidJson)?;
        Self::from_review(review)
    }

    pub fn from_review(review: AdmissionReview) -> Result<Self, ReviewError> {
        let api_version = match review.api_version {
            Some(v) if v == ADMISSION_API_VERSION || v == ADMISSION_API_VERSION_V1BETA1 => v,
            Some(v) => return Err(ReviewError::UnsupportedApiVersion(v)),
            None => ADMISSION_API_VERSION.to_string(),
        };

        if let Some(kind) = review.kind
            && kind != ADMISSION_REVIEW_KIND
        {
            return Err(ReviewError::UnexpectedKind(kind));
        }

        let raw = match review.request {
            Some(raw @ Value::Object(_)) => raw,
            _ => return Err(ReviewError::MissingRequest),
        };

        let uid = raw
            .get("uid")
            .and_then(Value::as_str)
            .ok_or(ReviewError::MissingUid)?
            .to_string();

        let fields = RequestFields::deserialize(&raw).map_err(ReviewError::InvalidField)?;

        Ok(Self {
            api_version,
            uid,
            kind: fields.kind,
            resource: fields.resource,
            sub_resource: fields.sub_resource,
            request_kind: fields.request_kind,
            request_resource: fields.request_resource,
            request_sub_resource: fields.request_sub_resource,
            name: fields.name,
            namespace: fields.namespace,
            operation: fields.operation,
            user_info: fields.user_info,
            object: fields.object,
            old_object: fields.old_object,
            options: fields.options,
            dry_run: fields.dry_run,
            raw,
        })
    }

    /// apiVersion of the envelope this request arrived in
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    /// The object after the operation. `None` for DELETE.
    pub fn object(&self) -> Option<&Value> {
        self.object.as_ref()
    }

    /// The object before the operation. `None` for CREATE and CONNECT.
    pub fn old_object(&self) -> Option<&Value> {
        self.old_object.as_ref()
    }

    pub fn options(&self) -> Option<&Value> {
        self.options.as_ref()
    }

    /// `options.kind`, e.g. `CreateOptions`
    pub fn options_kind(&self) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|o| o.get("kind"))
            .and_then(Value::as_str)
    }

    /// Whether the API server flagged this request as a dry run.
    /// An absent flag reads as `false`.
    pub fn dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    /// Group/version/kind of the object
    pub fn kind(&self) -> Option<&Value> {
        self.kind.as_ref()
    }

    pub fn resource(&self) -> Option<&Value> {
        self.resource.as_ref()
    }

    pub fn sub_resource(&self) -> Option<&str> {
        self.sub_resource.as_deref()
    }

    pub fn request_kind(&self) -> Option<&Value> {
        self.request_kind.as_ref()
    }

    pub fn request_resource(&self) -> Option<&Value> {
        self.request_resource.as_ref()
    }

    pub fn request_sub_resource(&self) -> Option<&str> {
        self.request_sub_resource.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn user_info(&self) -> Option<&Value> {
        self.user_info.as_ref()
    }

    /// The raw `request` mapping
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Resolve a path relative to the `request` mapping
    pub fn resolve(&self, path: &KeyPath) -> Result<Resolved<'_>, PathError> {
        path.resolve(&self.raw)
    }
}
