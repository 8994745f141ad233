//! Caller identity
//!
//! Who is operating the filesystem handle, and which lock tokens their
//! session carries. Commit-time lock verification and the lock operations
//! read this; everything else ignores it.

use std::collections::HashSet;

/// The identity attached to a filesystem handle
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    /// The authenticated username, if any
    pub username: Option<String>,
    /// Lock tokens the session presents at commit time
    pub lock_tokens: HashSet<String>,
}

impl AccessContext {
    /// An anonymous context with no tokens
    pub fn anonymous() -> Self {
        AccessContext::default()
    }

    /// A context for a named user
    pub fn for_user(username: impl Into<String>) -> Self {
        AccessContext {
            username: Some(username.into()),
            lock_tokens: HashSet::new(),
        }
    }

    /// Add a lock token to the session
    pub fn add_token(&mut self, token: impl Into<String>) {
        self.lock_tokens.insert(token.into());
    }
}
