//! Host events delivered into script sessions
//!
//! The host builds a [`TriggerEvent`] and hands it to a session. The session
//! keeps its own copy and rebuilds the `TriggerData` global from it on every
//! delivery, so nothing from a previous event survives.

use mlua::{Lua, LuaSerdeExt, SerializeOptions, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::{now_millis, Timestamp};

/// Name of the global table carrying the most recent event
pub const TRIGGER_DATA_GLOBAL: &str = "TriggerData";

/// Keys the bridge always sets; payload fields with these names are dropped
pub const RESERVED_KEYS: [&str; 2] = ["eventType", "timestamp"];

/// Kinds of host occurrence a macro can be triggered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerEventType {
    OnUpdate,
    OnChatMessage,
    OnConditionChange,
    OnTerritoryChange,
    OnTargetChange,
    OnAddonEvent,
    OnMacroStart,
    OnMacroStop,
}

impl TriggerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEventType::OnUpdate => "OnUpdate",
            TriggerEventType::OnChatMessage => "OnChatMessage",
            TriggerEventType::OnConditionChange => "OnConditionChange",
            TriggerEventType::OnTerritoryChange => "OnTerritoryChange",
            TriggerEventType::OnTargetChange => "OnTargetChange",
            TriggerEventType::OnAddonEvent => "OnAddonEvent",
            TriggerEventType::OnMacroStart => "OnMacroStart",
            TriggerEventType::OnMacroStop => "OnMacroStop",
        }
    }
}

impl fmt::Display for TriggerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload: nothing, a mapping flattened into the table, or a single
/// value exposed as `data`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum EventPayload {
    #[default]
    Empty,
    Fields(serde_json::Map<String, serde_json::Value>),
    Data(serde_json::Value),
}

impl From<serde_json::Value> for EventPayload {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => EventPayload::Empty,
            serde_json::Value::Object(map) => EventPayload::Fields(map),
            other => EventPayload::Data(other),
        }
    }
}

/// A host-originated occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_type: TriggerEventType,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl TriggerEvent {
    pub fn new(
        event_type: TriggerEventType,
        timestamp: Timestamp,
        payload: impl Into<EventPayload>,
    ) -> Self {
        Self {
            event_type,
            timestamp,
            payload: payload.into(),
        }
    }

    /// Event stamped with the current time
    pub fn now(event_type: TriggerEventType, payload: impl Into<EventPayload>) -> Self {
        Self::new(event_type, now_millis(), payload)
    }
}

/// Build a fresh `TriggerData` table for `event` (empty when `None`)
pub fn trigger_table(lua: &Lua, event: Option<&TriggerEvent>) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    let Some(event) = event else {
        return Ok(table);
    };

    table.raw_set("eventType", event.event_type.as_str())?;
    table.raw_set("timestamp", event.timestamp)?;

    // JSON null maps to nil so absent and null fields look the same to scripts
    let options = || {
        SerializeOptions::new()
            .serialize_none_to_null(false)
            .serialize_unit_to_null(false)
    };

    match &event.payload {
        EventPayload::Empty => {}
        EventPayload::Fields(fields) => {
            for (key, value) in fields {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    tracing::debug!("Dropping reserved payload key {:?}", key);
                    continue;
                }
                table.raw_set(key.as_str(), lua.to_value_with(value, options())?)?;
            }
        }
        EventPayload::Data(value) => {
            table.raw_set("data", lua.to_value_with(value, options())?)?;
        }
    }

    Ok(table)
}
