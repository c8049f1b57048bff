//! Client identity presented to the forwarding server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of client connecting to the forwarding server.
///
/// Serialized lowercase because the value travels as a query parameter and
/// inside the ping payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Inspector tooling observing a running app
    Inspector,
    /// The instrumented Flutter app itself
    Flutter,
}

impl ClientType {
    /// Wire representation, used verbatim in the connect URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Inspector => "inspector",
            ClientType::Flutter => "flutter",
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity sent as connection metadata on every (re)connect attempt.
///
/// Immutable for the lifetime of the client. When no explicit id is supplied
/// a random one is generated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_type: ClientType,
}

impl ClientIdentity {
    /// Create an identity with an explicit client id.
    pub fn new(client_id: impl Into<String>, client_type: ClientType) -> Self {
        Self {
            client_id: client_id.into(),
            client_type,
        }
    }

    /// Create an identity with a freshly generated client id.
    pub fn generate(client_type: ClientType) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            client_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_type_serializes_lowercase() {
        let json = serde_json::to_string(&ClientType::Inspector).expect("serialize");
        assert_eq!(json, "\"inspector\"");
        let json = serde_json::to_string(&ClientType::Flutter).expect("serialize");
        assert_eq!(json, "\"flutter\"");
    }

    #[test]
    fn generated_identities_are_unique() {
        let a = ClientIdentity::generate(ClientType::Flutter);
        let b = ClientIdentity::generate(ClientType::Flutter);
        assert_ne!(a.client_id, b.client_id);
        assert!(!a.client_id.is_empty());
    }
}
