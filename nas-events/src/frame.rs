// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use nas_types::WebEventType;
use serde::Serialize;

use crate::EventError;

/// A serialized event, shared by all connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    /// Monotonic per-broadcaster id; 0 is reserved for the welcome frame
    pub id: u64,
    pub event: WebEventType,
    /// JSON payload
    pub data: String,
}

impl EventFrame {
    pub fn encode<T: Serialize>(id: u64, event: WebEventType, payload: &T) -> Result<Self, EventError> {
        Ok(Self {
            id,
            event,
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Wire protocol of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// text/event-stream
    Sse,
    /// Text messages on an upgraded socket
    WebSocket,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::WebSocket => "ws",
        }
    }

    /// Frame text as written to the client
    pub fn render(self, frame: &EventFrame) -> String {
        match self {
            Self::Sse => format!(
                "id: {}\nevent: {}\nretry: 3000\ndata: {}\n\n",
                frame.id, frame.event, frame.data
            ),
            Self::WebSocket => format!(
                "id: {}\nevent: {}\ndata: {}\n\n",
                frame.id, frame.event, frame.data
            ),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
