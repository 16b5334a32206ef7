use serde::Deserialize;

use crate::error::Error;
use crate::types::ConversationSpaceId;

const REFRESH_REQUIRED: &str = "WEBSOCKET_REFRESH_REQUIRED";
const TO_BE_CLOSED: &str = "WEBSOCKET_TO_BE_CLOSED";
const CALL_EVENTS_REPORT_SOURCE: &str = "call-events-report";

#[derive(Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    content: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportContent {
    conversation_space_id: ConversationSpaceId,
}

/// Inbound text frame, classified for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    /// The channel must be refreshed to stay alive.
    RefreshRequired,
    /// The server is about to close this socket.
    ToBeClosed,
    /// A conversation's call events report is ready.
    Report(ConversationSpaceId),
    Other {
        kind: Option<String>,
        source: Option<String>,
    },
}

impl Notification {
    pub(crate) fn parse(text: &str) -> Result<Self, Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let data = envelope.data;

        match data.kind.as_deref() {
            Some(REFRESH_REQUIRED) => return Ok(Self::RefreshRequired),
            Some(TO_BE_CLOSED) => return Ok(Self::ToBeClosed),
            _ => {}
        }

        if data.source.as_deref() == Some(CALL_EVENTS_REPORT_SOURCE) {
            let content = data.content.ok_or_else(|| {
                Error::Protocol("call events notification without content".into())
            })?;
            let content: ReportContent = serde_json::from_value(content)?;
            return Ok(Self::Report(content.conversation_space_id));
        }

        Ok(Self::Other {
            kind: data.kind,
            source: data.source,
        })
    }
}
