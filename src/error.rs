use std::fmt;

/// Position in the pipeline that produced a handler error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// A service-wide or method-local pre-handler
    Pre,
    /// The method's primary handler
    Primary,
    /// A method-local or service-wide post-handler
    Post,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pre => "pre",
            Stage::Primary => "primary",
            Stage::Post => "post",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error category, for mapping onto wire-level status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MethodNotFound,
    Unauthenticated,
    Throttled,
    Handler,
}

/// Error returned by [`Registry::dispatch`](crate::registry::Registry::dispatch)
/// and [`Method::dispatch`](crate::method::Method::dispatch).
///
/// Handler failures are carried verbatim in [`DispatchError::Handler`]; the
/// engine only tags them with the stage that produced them.
#[derive(Debug)]
pub enum DispatchError {
    /// No method is registered under the requested name
    MethodNotFound {
        /// The name that was looked up
        method: String,
    },
    /// The method requires authentication and the request did not pass it
    ///
    /// Raised before any handler runs.
    Unauthenticated {
        method: String,
        /// Human-readable reason (missing credentials, unknown kind, rejected)
        reason: String,
    },
    /// The method's rate limiter denied admission
    ///
    /// Raised before any handler runs.
    Throttled { method: String },
    /// A pre, primary or post handler returned an error
    Handler {
        method: String,
        stage: Stage,
        /// The handler's own error, unchanged
        source: anyhow::Error,
    },
}

impl DispatchError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            DispatchError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            DispatchError::Throttled { .. } => ErrorKind::Throttled,
            DispatchError::Handler { .. } => ErrorKind::Handler,
        }
    }

    /// Name of the method the failed call targeted
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            DispatchError::MethodNotFound { method }
            | DispatchError::Unauthenticated { method, .. }
            | DispatchError::Throttled { method }
            | DispatchError::Handler { method, .. } => method,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::MethodNotFound { .. })
    }

    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, DispatchError::Throttled { .. })
    }

    /// Stage that failed, for handler errors
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DispatchError::Handler { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The handler's original error, for handler errors
    ///
    /// Use `downcast_ref` on the result to recover a concrete error type.
    #[must_use]
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            DispatchError::Handler { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Consume the error and return the handler's original error, if any
    #[must_use]
    pub fn into_handler_error(self) -> Option<anyhow::Error> {
        match self {
            DispatchError::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::MethodNotFound { method } => {
                write!(f, "method not found: '{}'", method)
            }
            DispatchError::Unauthenticated { method, reason } => {
                write!(f, "authentication failed for '{}': {}", method, reason)
            }
            DispatchError::Throttled { method } => {
                write!(
                    f,
                    "request limit exceeded for '{}': the maximum request rate is exceeded",
                    method
                )
            }
            DispatchError::Handler {
                method,
                stage,
                source,
            } => write!(f, "{} handler of '{}' failed: {}", stage, method, source),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Handler { source, .. } => Some(&**source),
            _ => None,
        }
    }
}
