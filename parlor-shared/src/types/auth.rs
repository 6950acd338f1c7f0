use serde::{Deserialize, Serialize};

/// Raw bearer credential taken from the `Authorization` header.
///
/// The token is opaque at this layer; services resolve it to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken(pub String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the credential itself
        write!(f, "Bearer <{} chars>", self.0.len())
    }
}
