//! Close reasons carried by CLOSE frames

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolViolation;
use crate::models::websocket::MAX_CONTROL_PAYLOAD;

/// Well-known close status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    CannotAccept,
    NotConsistent,
    ViolatedPolicy,
    TooBig,
    NoExtension,
    InternalError,
    ServiceRestart,
    TryAgainLater,
}

impl CloseCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(CloseCode::Normal),
            1001 => Some(CloseCode::GoingAway),
            1002 => Some(CloseCode::ProtocolError),
            1003 => Some(CloseCode::CannotAccept),
            1007 => Some(CloseCode::NotConsistent),
            1008 => Some(CloseCode::ViolatedPolicy),
            1009 => Some(CloseCode::TooBig),
            1010 => Some(CloseCode::NoExtension),
            1011 => Some(CloseCode::InternalError),
            1012 => Some(CloseCode::ServiceRestart),
            1013 => Some(CloseCode::TryAgainLater),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::CannotAccept => 1003,
            CloseCode::NotConsistent => 1007,
            CloseCode::ViolatedPolicy => 1008,
            CloseCode::TooBig => 1009,
            CloseCode::NoExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::ServiceRestart => 1012,
            CloseCode::TryAgainLater => 1013,
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// Status code and message describing why a connection closed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CloseReasonFields")]
pub struct CloseReason {
    code: u16,
    message: String,
}

/// Unchecked wire form, validated through [`CloseReason::new`]
#[derive(Deserialize)]
struct CloseReasonFields {
    code: u16,
    #[serde(default)]
    message: String,
}

impl TryFrom<CloseReasonFields> for CloseReason {
    type Error = ProtocolViolation;

    fn try_from(fields: CloseReasonFields) -> Result<Self, Self::Error> {
        Self::new(fields.code, fields.message)
    }
}

impl CloseReason {
    /// Longest message that still fits next to the 2-byte code
    pub const MAX_MESSAGE_LEN: usize = MAX_CONTROL_PAYLOAD - 2;

    pub fn new(code: u16, message: impl Into<String>) -> Result<Self, ProtocolViolation> {
        let message = message.into();
        if message.len() > Self::MAX_MESSAGE_LEN {
            return Err(ProtocolViolation::CloseReasonTooLong(message.len()));
        }
        Ok(Self { code, message })
    }

    pub fn from_code(
        code: CloseCode,
        message: impl Into<String>,
    ) -> Result<Self, ProtocolViolation> {
        Self::new(code.as_u16(), message)
    }

    /// Normal closure without a message
    pub fn normal() -> Self {
        Self {
            code: CloseCode::Normal.as_u16(),
            message: String::new(),
        }
    }

    /// Reply sent when a peer's close frame carried no usable reason
    pub(crate) fn ok() -> Self {
        Self {
            code: CloseCode::Normal.as_u16(),
            message: "OK".to_string(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn known_code(&self) -> Option<CloseCode> {
        CloseCode::from_u16(self.code)
    }

    /// Decode a close frame payload
    ///
    /// An empty payload carries no reason. A single byte, invalid UTF-8 or an
    /// oversized payload is malformed.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, ProtocolViolation> {
        match payload.len() {
            0 => Ok(None),
            1 => Err(ProtocolViolation::InvalidClosePayload),
            len if len > MAX_CONTROL_PAYLOAD => {
                Err(ProtocolViolation::ControlFrameTooLarge(len as u64))
            }
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                let message = std::str::from_utf8(&payload[2..])
                    .map_err(|_| ProtocolViolation::InvalidClosePayload)?;
                Ok(Some(Self {
                    code,
                    message: message.to_string(),
                }))
            }
        }
    }

    /// Encode as a close frame payload
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.message.len());
        payload.extend_from_slice(&self.code.to_be_bytes());
        payload.extend_from_slice(self.message.as_bytes());
        payload
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_enforces_message_limit() {
        let reason: CloseReason =
            serde_json::from_str(r#"{ "code": 1001, "message": "Going away" }"#).unwrap();
        assert_eq!(reason, CloseReason::new(1001, "Going away").unwrap());

        let json = serde_json::to_string(&CloseReason::normal()).unwrap();
        assert_eq!(serde_json::from_str::<CloseReason>(&json).unwrap(), CloseReason::normal());

        let too_long = format!(
            r#"{{ "code": 1000, "message": "{}" }}"#,
            "x".repeat(CloseReason::MAX_MESSAGE_LEN + 1)
        );
        let err = serde_json::from_str::<CloseReason>(&too_long).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn parse_empty_payload_has_no_reason() {
        assert_eq!(CloseReason::parse(&[]).unwrap(), None);
    }

    #[test]
    fn parse_code_and_message() {
        let mut payload = 1001u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"Going away");

        let reason = CloseReason::parse(&payload).unwrap().unwrap();
        assert_eq!(reason.code(), 1001);
        assert_eq!(reason.message(), "Going away");
        assert_eq!(reason.known_code(), Some(CloseCode::GoingAway));
    }

    #[test]
    fn parse_rejects_single_byte_and_bad_utf8() {
        assert_eq!(
            CloseReason::parse(&[0x03]),
            Err(ProtocolViolation::InvalidClosePayload)
        );
        assert_eq!(
            CloseReason::parse(&[0x03, 0xe8, 0xff, 0xfe]),
            Err(ProtocolViolation::InvalidClosePayload)
        );
    }

    #[test]
    fn encode_normal_is_two_bytes() {
        assert_eq!(CloseReason::normal().encode(), vec![0x03, 0xe8]);
    }

    #[test]
    fn message_length_is_bounded() {
        assert!(CloseReason::from_code(CloseCode::Normal, "x".repeat(123)).is_ok());
        assert_eq!(
            CloseReason::from_code(CloseCode::Normal, "x".repeat(124)),
            Err(ProtocolViolation::CloseReasonTooLong(124))
        );
    }

    #[test]
    fn unknown_codes_are_kept_verbatim() {
        let reason = CloseReason::new(4321, "app").unwrap();
        assert_eq!(reason.known_code(), None);
        let decoded = CloseReason::parse(&reason.encode()).unwrap().unwrap();
        assert_eq!(decoded.code(), 4321);
        assert_eq!(decoded.to_string(), "4321 app");
    }
}
