// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    /// The payload type has no entry in the event map
    #[error("unknown event type: {type_name}")]
    UnknownEventType { type_name: String },

    #[error("failed to serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write to client: {message}")]
    Sink { message: String },

    #[error("event channel closed")]
    Closed,
}
