//! API key check for observers connecting to the simulator.
//!
//! Any non-empty string key is accepted. Session storage and real key
//! verification belong to an outer service; this only decides the reply.

use crate::protocol::{AuthReply, ClientMessage, ProtocolError, ServerMessage};
use serde_json::Value;
use thiserror::Error;

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing, empty or non-string `apiKey`
    #[error("Invalid API key")]
    InvalidKey,
}

/// Accepts any non-empty string key.
pub fn authenticate(api_key: Option<&Value>) -> Result<(), AuthError> {
    match api_key {
        Some(Value::String(key)) if !key.is_empty() => Ok(()),
        _ => Err(AuthError::InvalidKey),
    }
}

/// What the transport should do after an observer message.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    /// Message to send back to the observer
    pub reply: ServerMessage,

    /// The transport should close the connection once the reply is sent
    pub close: bool,
}

/// Handles one raw text message from an observer.
///
/// Malformed input yields an error for the caller to log; it never produces
/// a reply or disturbs other observers.
pub fn handle_client_text(text: &str) -> Result<ClientResponse, ProtocolError> {
    match ClientMessage::decode(text)? {
        ClientMessage::Auth { api_key } => {
            let result = authenticate(api_key.as_ref());
            Ok(ClientResponse {
                reply: ServerMessage::Auth(AuthReply {
                    success: result.is_ok(),
                    error: result.as_ref().err().map(ToString::to_string),
                }),
                close: result.is_err(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_json(text: &str) -> String {
        handle_client_text(text).unwrap().reply.encode().unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        let response = handle_client_text(r#"{"type":"auth","apiKey":""}"#).unwrap();
        assert!(response.close);
        assert_eq!(
            response.reply,
            ServerMessage::Auth(AuthReply {
                success: false,
                error: Some("Invalid API key".into()),
            })
        );
    }

    #[test]
    fn test_non_empty_key_accepted() {
        let response = handle_client_text(r#"{"type":"auth","apiKey":"abc"}"#).unwrap();
        assert!(!response.close);
        assert_eq!(reply_json(r#"{"type":"auth","apiKey":"abc"}"#), r#"{"type":"auth","success":true}"#);
    }

    #[test]
    fn test_missing_or_wrong_type_key_rejected() {
        assert_eq!(
            reply_json(r#"{"type":"auth"}"#),
            r#"{"type":"auth","success":false,"error":"Invalid API key"}"#
        );
        assert!(handle_client_text(r#"{"type":"auth","apiKey":42}"#).unwrap().close);
        assert!(handle_client_text(r#"{"type":"auth","apiKey":null}"#).unwrap().close);
    }

    #[test]
    fn test_garbage_is_an_error_not_a_reply() {
        assert!(matches!(
            handle_client_text("{{{"),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(handle_client_text(r#"{"type":"subscribe"}"#).is_err());
    }
}
