//! Cross-context messages exchanged between UI surfaces and the coordinator.
//!
//! Each message is one JSON object tagged by `action`, with camelCase fields.

use crate::relay::{Increment, RequestId};
use serde::{Deserialize, Serialize};

/// Surface → coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Inbound {
    #[serde(rename_all = "camelCase")]
    Generate {
        prompt: String,
        #[serde(default)]
        context: String,
        request_id: RequestId,
    },
    Ping,
}

/// Coordinator → surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    StreamChunk { chunk: String, request_id: RequestId },

    /// The one reply to a `generate`.
    #[serde(rename_all = "camelCase")]
    Reply {
        request_id: RequestId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Pong { version: String },
}

impl Outbound {
    pub fn ok(request_id: RequestId, data: String) -> Self {
        Outbound::Reply {
            request_id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(request_id: RequestId, error: String) -> Self {
        Outbound::Reply {
            request_id,
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

impl From<Increment> for Outbound {
    fn from(inc: Increment) -> Self {
        Outbound::StreamChunk {
            chunk: inc.text,
            request_id: inc.request_id,
        }
    }
}
