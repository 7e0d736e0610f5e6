//! Request context handed to every handler stage.
//!
//! The transport layer builds a [`Request`] per inbound call and passes it by
//! reference into [`Registry::dispatch`](crate::registry::Registry::dispatch).
//! The dispatch engine never mutates or retains it; handlers receive the same
//! `&Request` in every stage.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use smallvec::SmallVec;

use crate::ids::RequestId;

/// Maximum inline metadata entries before heap allocation
pub const MAX_INLINE_METADATA: usize = 8;

/// Stack-allocated metadata storage (session keys, trace headers, etc.)
///
/// Names use `Arc<str>` so repeated keys clone in O(1).
pub type MetadataVec = SmallVec<[(Arc<str>, String); MAX_INLINE_METADATA]>;

/// Credentials presented by the caller.
///
/// `kind` selects the [`Authenticator`](crate::security::Authenticator)
/// that verifies `key` (e.g. `"token"`, `"api_key"`, `"password"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub kind: String,
    pub key: String,
}

impl Auth {
    #[must_use]
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

/// A single RPC call as seen by handlers
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    /// Name of the method being called
    pub method: String,
    /// Call arguments as decoded by the transport
    pub args: Value,
    /// Credentials, if the caller sent any
    pub auth: Option<Auth>,
    /// Caller identity; set by the transport or an authenticator upstream
    pub username: Option<String>,
    /// Free-form session metadata (stack-allocated for ≤8 entries)
    pub metadata: MetadataVec,
    /// Deadline handlers are expected to honor. Dispatch does not enforce it.
    pub deadline: Option<Instant>,
}

impl Request {
    /// Create a request with a fresh id and no credentials
    #[must_use]
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            request_id: RequestId::new(),
            method: method.into(),
            args,
            auth: None,
            username: None,
            metadata: MetadataVec::new(),
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    #[must_use]
    pub fn with_auth(mut self, kind: impl Into<String>, key: impl Into<String>) -> Self {
        self.auth = Some(Auth::new(kind, key));
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Add a metadata entry. A later entry with the same name shadows an earlier one.
    #[must_use]
    pub fn with_metadata(mut self, name: &str, value: impl Into<String>) -> Self {
        self.metadata.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Get a metadata value by name
    ///
    /// Uses "last write wins" semantics when a name was added more than once.
    #[inline]
    #[must_use]
    pub fn get_metadata(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a top-level field of the call arguments
    #[inline]
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// True once the deadline (if any) has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
