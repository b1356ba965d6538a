use http::HeaderMap;

/// Caller identity as resolved by the hosting HTTP layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            organization_id: None,
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

/// Inbound request descriptor handed to [`AdmissionEngine::admit`](crate::engine::AdmissionEngine::admit).
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub identity: Identity,
}

impl AdmissionRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HeaderMap::new(),
            identity: Identity::default(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Only safe, idempotent requests are served from or written to the cache.
    pub fn is_cacheable_method(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}
