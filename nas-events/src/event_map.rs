// SPDX-License-Identifier: GPL-3.0-only

use std::any::{TypeId, type_name};
use std::collections::HashMap;

use nas_types::{
    DataDirtyTracker, Disk, HealthPing, SharedResource, UpdateProgress, WebEventType, Welcome,
};

use crate::EventError;

/// Payload type → event name, shared by every transport
#[derive(Debug, Clone, Default)]
pub struct EventMap {
    by_type: HashMap<TypeId, WebEventType>,
}

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map payload type `T` to `event`, replacing an earlier mapping
    pub fn register<T: 'static>(&mut self, event: WebEventType) -> &mut Self {
        self.by_type.insert(TypeId::of::<T>(), event);
        self
    }

    /// Every broadcastable payload of the backend
    pub fn standard() -> Self {
        let mut map = Self::new();
        map.register::<Welcome>(WebEventType::Hello)
            .register::<UpdateProgress>(WebEventType::Updating)
            .register::<Vec<Disk>>(WebEventType::Volumes)
            .register::<HealthPing>(WebEventType::Heartbeat)
            .register::<Vec<SharedResource>>(WebEventType::Shares)
            .register::<DataDirtyTracker>(WebEventType::DirtyDataTracker);
        map
    }

    pub fn event_for<T: 'static>(&self) -> Result<WebEventType, EventError> {
        self.by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| EventError::UnknownEventType {
                type_name: type_name::<T>().to_string(),
            })
    }

    /// Registered event names, sorted and deduplicated
    pub fn supported_events(&self) -> Vec<WebEventType> {
        let mut events: Vec<_> = self.by_type.values().copied().collect();
        events.sort();
        events.dedup();
        events
    }
}
