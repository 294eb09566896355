// SPDX-License-Identifier: GPL-3.0-only

//! Change notification fan-out
//!
//! Producers hand a typed payload to the [`Broadcaster`]; the payload's type
//! is resolved to a [`WebEventType`](nas_types::WebEventType) through the one
//! [`EventMap`], serialized once, and delivered to every connected client
//! regardless of its transport. Each connection drains its own bounded queue,
//! so a slow client loses its oldest events instead of stalling producers.

mod broadcaster;
mod error;
mod event_map;
mod frame;
mod sender;

pub use broadcaster::{Broadcaster, WelcomeInfo};
pub use error::EventError;
pub use event_map::EventMap;
pub use frame::{EventFrame, Transport};
pub use sender::{EventSink, MessageSender, SinkAdapter};
