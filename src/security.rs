//! # Security Module
//!
//! Token verification is the transport's business; the dispatch engine only
//! needs a yes/no answer for methods whose authentication flag is set. That
//! answer comes from an [`Authenticator`], registered on the
//! [`Registry`](crate::registry::Registry) per credential kind.
//!
//! ## Flow
//!
//! 1. The transport attaches credentials to the [`Request`] as [`Auth`](crate::request::Auth)
//! 2. The registry reads the method's authentication flag once per dispatch
//! 3. If set, the authenticator registered for `auth.kind` is invoked
//! 4. On failure the call ends with `Unauthenticated` before any handler runs
//!
//! ```rust
//! use methodchain::registry::Registry;
//! use methodchain::request::Request;
//! use methodchain::runtime_config::RuntimeConfig;
//! use methodchain::security::StaticKeyAuthenticator;
//! use serde_json::{json, Value};
//!
//! let registry = Registry::new(RuntimeConfig::default());
//! registry.authenticator("token", StaticKeyAuthenticator::new(["s3cret"]));
//! registry.handle_fn("whoami", |_req: &Request| Ok(Some(json!("you"))));
//!
//! let signed = Request::new("whoami", Value::Null).with_auth("token", "s3cret");
//! assert!(registry.dispatch("whoami", &signed).is_ok());
//! let denied = registry.dispatch("whoami", &Request::new("whoami", Value::Null));
//! assert!(denied.is_err());
//! ```

use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::request::Request;

/// Verifies the credentials carried by a request
pub trait Authenticator: Send + Sync + 'static {
    /// Return `Ok(())` to let the call proceed; the error text becomes the
    /// `Unauthenticated` reason.
    fn authenticate(&self, req: &Request) -> Result<()>;
}

impl<F> Authenticator for F
where
    F: Fn(&Request) -> Result<()> + Send + Sync + 'static,
{
    fn authenticate(&self, req: &Request) -> Result<()> {
        self(req)
    }
}

/// Accepts requests whose key is one of a fixed set
pub struct StaticKeyAuthenticator {
    keys: HashSet<String>,
}

impl StaticKeyAuthenticator {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Authenticator for StaticKeyAuthenticator {
    fn authenticate(&self, req: &Request) -> Result<()> {
        match &req.auth {
            Some(auth) if self.keys.contains(&auth.key) => Ok(()),
            Some(_) => Err(anyhow!("invalid key")),
            None => Err(anyhow!("no credentials")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_static_key_authenticator() {
        let auth = StaticKeyAuthenticator::new(["a", "b"]);
        let base = Request::new("m", Value::Null);

        let valid = base.clone().with_auth("token", "a");
        assert!(auth.authenticate(&valid).is_ok());
        let err = auth
            .authenticate(&base.clone().with_auth("token", "c"))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid key");
        assert!(auth.authenticate(&base).is_err());
    }

    #[test]
    fn test_closure_authenticator() {
        let only_admin = |req: &Request| {
            if req.username.as_deref() == Some("admin") {
                Ok(())
            } else {
                Err(anyhow!("admins only"))
            }
        };
        let req = Request::new("m", Value::Null).with_username("admin");
        assert!(only_admin.authenticate(&req).is_ok());
        assert!(only_admin
            .authenticate(&Request::new("m", Value::Null))
            .is_err());
    }
}
