//! Messages from live viewers to the hub

use serde::{Deserialize, Serialize};
use waypost_util::ClientId;

/// Role a viewer connects with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Dispatch/admin dashboards; also receive driver status changes
    Admin,
    /// Any other viewer
    #[default]
    #[serde(other)]
    Viewer,
}

impl ClientRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Identity of a connected viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
}

impl ClientInfo {
    pub fn new(client_id: ClientId, role: ClientRole) -> Self {
        Self { client_id, role }
    }

    pub fn admin(client_id: ClientId) -> Self {
        Self::new(client_id, ClientRole::Admin)
    }

    pub fn viewer(client_id: ClientId) -> Self {
        Self::new(client_id, ClientRole::Viewer)
    }
}

/// Lines a viewer may send, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First line on every connection
    Hello {
        #[serde(default)]
        client_id: Option<ClientId>,
        #[serde(default)]
        role: ClientRole,
    },

    /// Reply to a hub ping
    Pong,
}

impl ClientMessage {
    pub fn hello(client_id: Option<ClientId>, role: ClientRole) -> Self {
        ClientMessage::Hello { client_id, role }
    }

    /// Resolve a hello into the viewer identity, generating an id when absent.
    pub fn into_client_info(self) -> Option<ClientInfo> {
        match self {
            ClientMessage::Hello { client_id, role } => Some(ClientInfo::new(
                client_id.unwrap_or_else(ClientId::generate),
                role,
            )),
            ClientMessage::Pong => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_with_admin_role() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"hello","client_id":"ops-1","role":"admin"}"#).unwrap();
        let info = msg.into_client_info().unwrap();
        assert_eq!(info.client_id, ClientId::new("ops-1"));
        assert!(info.role.is_admin());
    }

    #[test]
    fn unknown_or_missing_role_is_viewer() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"hello","role":"dispatcher"}"#).unwrap();
        let info = msg.into_client_info().unwrap();
        assert_eq!(info.role, ClientRole::Viewer);
        assert!(!info.client_id.as_str().is_empty());

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"hello"}"#).unwrap();
        assert_eq!(msg.into_client_info().unwrap().role, ClientRole::Viewer);
    }

    #[test]
    fn pong_is_not_a_handshake() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Pong);
        assert!(msg.into_client_info().is_none());
    }
}
