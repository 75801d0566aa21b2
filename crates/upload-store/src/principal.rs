use crate::StoreError;

/// An authenticated user. Scopes a private storage namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub username: String,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// Per-call context handed to every store operation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    principal: Option<Principal>,
}

impl CallContext {
    /// A context without an authenticated user.
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    /// A context carrying `principal`.
    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    /// Returns the principal, or [`StoreError::Unauthenticated`] if absent.
    pub fn principal(&self) -> Result<&Principal, StoreError> {
        self.principal.as_ref().ok_or(StoreError::Unauthenticated)
    }
}
