//! Module that contains the messages exchanged between processes of the mesh.

use crate::{timestamp::*, ProcessId};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Enum that represents the three kinds of protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    RequestResource,
    ReleaseResource,
    Acknowledgment,
}

/// Struct that represents a message sent from one process to another.
///
/// `RequestResource` and `ReleaseResource` carry the request they are about;
/// `Acknowledgment` carries none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub timestamp: Timestamp,
    pub sender: ProcessId,
    pub request: Option<Request>,
}

/// Struct that represents a message waiting in a process' outbox for delivery to `to`.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub to: ProcessId,
    pub message: Message,
}

impl Message {
    /// Function that creates a message sent by the process `timestamp` belongs to.
    pub fn new(kind: MessageKind, timestamp: Timestamp, request: Option<Request>) -> Self {
        Self {
            kind,
            timestamp,
            sender: timestamp.process,
            request,
        }
    }

    /// Function that returns the message as a JSON formatted `String`.
    pub fn to_json_string(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(serde_json::to_string(self)?)
    }

    /// Function that parses the message from a JSON formatted `String`.
    pub fn from_json_string(token: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(serde_json::from_str::<Self>(token)?)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestResource => "RequestResource",
            Self::ReleaseResource => "ReleaseResource",
            Self::Acknowledgment => "Acknowledgment",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}, Time:{}, From:{}",
            self.kind, self.timestamp.time, self.sender
        )?;
        if let Some(request) = &self.request {
            write!(f, ", {request}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_per_kind() {
        let request = Request::new(0, 0);
        let mut message = Message::new(
            MessageKind::RequestResource,
            Timestamp::new(0, 0),
            Some(request),
        );
        assert_eq!(
            message.to_string(),
            "{RequestResource, Time:0, From:0, <T0:P0>}"
        );

        message.kind = MessageKind::ReleaseResource;
        assert_eq!(
            message.to_string(),
            "{ReleaseResource, Time:0, From:0, <T0:P0>}"
        );

        let ack = Message::new(MessageKind::Acknowledgment, Timestamp::new(4, 2), None);
        assert_eq!(ack.to_string(), "{Acknowledgment, Time:4, From:2}");
    }

    #[test]
    fn test_sender_follows_timestamp() {
        let message = Message::new(MessageKind::Acknowledgment, Timestamp::new(9, 3), None);
        assert_eq!(message.sender, 3);
    }

    #[test]
    fn test_json_keeps_every_field() {
        let message = Message::new(
            MessageKind::ReleaseResource,
            Timestamp::new(12, 1),
            Some(Request::new(7, 1)),
        );
        let parsed = Message::from_json_string(&message.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_json_rejects_garbage() {
        assert!(Message::from_json_string("{\"kind\":\"Nope\"}").is_err());
    }
}
