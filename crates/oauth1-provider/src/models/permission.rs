use serde::{Deserialize, Serialize};

/// Descriptor of an opaque permission (scope) identifier such as `read_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthPermission {
    pub permission: String,
    /// Human-readable label shown on the consent page.
    pub description: String,
    /// Granted when a client requests no explicit permissions.
    #[serde(default)]
    pub is_default: bool,
    /// HTTP methods this permission covers. Empty means all.
    #[serde(default)]
    pub http_verbs: Vec<String>,
    /// URI prefixes this permission covers. Empty means all.
    #[serde(default)]
    pub uris: Vec<String>,
}

impl OAuthPermission {
    #[must_use]
    pub fn new(permission: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            description: description.into(),
            is_default: false,
            http_verbs: Vec::new(),
            uris: Vec::new(),
        }
    }

    #[must_use]
    pub fn default_granted(mut self) -> Self {
        self.is_default = true;
        self
    }

    #[must_use]
    pub fn with_http_verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.http_verbs = verbs.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_uris<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uris = uris.into_iter().map(Into::into).collect();
        self
    }
}
