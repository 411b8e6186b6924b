//! Wire envelopes exchanged with WebSocket clients.
//!
//! The wire format is a small JSON contract with numeric type tags:
//!
//! - Settings (server → client, once per connection):
//!   `{"type": 0, "id": "<identity>"}`
//! - Text (server → client): `{"type": 1, "text": "<content>"}`
//! - Text (client → server): `{"text": "<content>", "to": "<targetIdentity>"}`
//!
//! Inbound payloads carry no type tag; clients only ever send addressed text.

use serde::{Deserialize, Serialize};

/// Numeric tag for the settings envelope.
pub const ENVELOPE_TYPE_SETTINGS: u8 = 0;
/// Numeric tag for the outbound text envelope.
pub const ENVELOPE_TYPE_TEXT: u8 = 1;

/// A server-to-client envelope.
///
/// Every connection receives exactly one [`Outbound::Settings`] as its first
/// message, carrying the identity assigned at connect time. All subsequent
/// outbound messages are [`Outbound::Text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OutboundWire", into = "OutboundWire")]
pub enum Outbound {
    /// Informs the client of its assigned identity.
    Settings {
        /// The identity assigned to this connection.
        id: String,
    },
    /// A relayed text message.
    Text {
        /// The message content.
        text: String,
    },
}

impl Outbound {
    /// Encode the envelope as a JSON string.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A client-to-server envelope: text addressed to another identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    /// The message content.
    pub text: String,
    /// The target identity.
    pub to: String,
}

impl Inbound {
    /// Decode an inbound envelope from raw JSON.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Flat wire representation bridging [`Outbound`] to its tagged JSON form.
#[derive(Serialize, Deserialize)]
struct OutboundWire {
    #[serde(rename = "type")]
    ty: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl From<Outbound> for OutboundWire {
    fn from(env: Outbound) -> Self {
        match env {
            Outbound::Settings { id } => Self {
                ty: ENVELOPE_TYPE_SETTINGS,
                id: Some(id),
                text: None,
            },
            Outbound::Text { text } => Self {
                ty: ENVELOPE_TYPE_TEXT,
                id: None,
                text: Some(text),
            },
        }
    }
}

impl TryFrom<OutboundWire> for Outbound {
    type Error = String;

    fn try_from(wire: OutboundWire) -> Result<Self, Self::Error> {
        match wire.ty {
            ENVELOPE_TYPE_SETTINGS => {
                let id = wire.id.ok_or("settings envelope missing `id`")?;
                Ok(Outbound::Settings { id })
            }
            ENVELOPE_TYPE_TEXT => {
                let text = wire.text.ok_or("text envelope missing `text`")?;
                Ok(Outbound::Text { text })
            }
            other => Err(format!("unknown envelope type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_wire_format() {
        let env = Outbound::Settings { id: "42".into() };
        let json: serde_json::Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"type": 0, "id": "42"}));
    }

    #[test]
    fn text_wire_format() {
        let env = Outbound::Text { text: "hi".into() };
        let json: serde_json::Value = serde_json::from_str(&env.encode().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"type": 1, "text": "hi"}));
    }

    #[test]
    fn outbound_round_trip() {
        for env in [
            Outbound::Settings { id: "7".into() },
            Outbound::Text { text: "hello".into() },
        ] {
            let parsed: Outbound = serde_json::from_str(&env.encode().unwrap()).unwrap();
            assert_eq!(parsed, env);
        }
    }

    #[test]
    fn inbound_decode() {
        let inbound = Inbound::decode(r#"{"text":"hi","to":"7"}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound {
                text: "hi".into(),
                to: "7".into()
            }
        );
    }

    #[test]
    fn inbound_decode_rejects_malformed() {
        assert!(Inbound::decode(r#"{"text":"hi"}"#).is_err());
        assert!(Inbound::decode("not json").is_err());
    }

    #[test]
    fn unknown_type_tag_rejected() {
        assert!(serde_json::from_str::<Outbound>(r#"{"type":9,"text":"hi"}"#).is_err());
    }
}
