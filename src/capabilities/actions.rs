//! `Actions` module: execute actions and query action state

use mlua::LuaSerdeExt;
use serde::Serialize;
use std::sync::Arc;

use crate::capabilities::binding::{
    Arity, CapabilityModule, EnumBinding, FunctionBinding, PropertyBinding,
};

/// Kinds of action the host can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionType {
    Action = 1,
    Item = 2,
    GeneralAction = 5,
    CraftAction = 9,
    PetAction = 11,
    Mount = 13,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Action,
        ActionType::Item,
        ActionType::GeneralAction,
        ActionType::CraftAction,
        ActionType::PetAction,
        ActionType::Mount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionType::Action => "Action",
            ActionType::Item => "Item",
            ActionType::GeneralAction => "GeneralAction",
            ActionType::CraftAction => "CraftAction",
            ActionType::PetAction => "PetAction",
            ActionType::Mount => "Mount",
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as i64 == id)
    }
}

/// Limit break gauge as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LimitBreakStatus {
    pub current_units: u32,
    pub bar_units: u32,
    pub bar_count: u32,
}

/// Static and cooldown information about one action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionInfo {
    pub id: u32,
    pub name: String,
    pub action_type: ActionType,
    pub recast_seconds: f32,
    pub usable: bool,
}

/// The host operations behind the `Actions` module
pub trait ActionHost: Send + Sync {
    /// Queue an action; returns whether the host accepted it
    fn use_action(&self, action_type: ActionType, action_id: u32) -> bool;

    fn teleport(&self, destination_id: u32) -> bool;

    fn cancel_cast(&self);

    fn limit_break(&self) -> LimitBreakStatus;

    fn action_info(&self, action_id: u32) -> Option<ActionInfo>;
}

pub struct ActionsModule {
    host: Arc<dyn ActionHost>,
}

impl ActionsModule {
    pub fn new(host: Arc<dyn ActionHost>) -> Self {
        Self { host }
    }
}

impl CapabilityModule for ActionsModule {
    fn name(&self) -> &'static str {
        "Actions"
    }

    fn functions(&self) -> Vec<FunctionBinding> {
        let execute = Arc::clone(&self.host);
        let general = Arc::clone(&self.host);
        let teleport = Arc::clone(&self.host);
        let cancel = Arc::clone(&self.host);
        let info = Arc::clone(&self.host);

        vec![
            FunctionBinding::new(
                "ExecuteAction",
                Arity::range(1, 2),
                move |_, (action_id, action_type): (u32, Option<i64>)| {
                    let action_type = match action_type {
                        None => ActionType::Action,
                        Some(id) => ActionType::from_id(id).ok_or_else(|| {
                            mlua::Error::RuntimeError(format!("unknown ActionType {}", id))
                        })?,
                    };
                    Ok(execute.use_action(action_type, action_id))
                },
            ),
            FunctionBinding::new(
                "ExecuteGeneralAction",
                Arity::exact(1),
                move |_, action_id: u32| Ok(general.use_action(ActionType::GeneralAction, action_id)),
            ),
            FunctionBinding::new("Teleport", Arity::exact(1), move |_, destination: u32| {
                Ok(teleport.teleport(destination))
            }),
            FunctionBinding::new("CancelCast", Arity::exact(0), move |_, ()| {
                cancel.cancel_cast();
                Ok(())
            }),
            FunctionBinding::new("GetActionInfo", Arity::exact(1), move |lua, action_id: u32| {
                match info.action_info(action_id) {
                    Some(info) => lua.to_value(&info),
                    None => Ok(mlua::Value::Nil),
                }
            }),
        ]
    }

    fn properties(&self) -> Vec<PropertyBinding> {
        let host = Arc::clone(&self.host);
        vec![PropertyBinding::new("LimitBreak", move |lua| {
            lua.to_value(&host.limit_break())
        })]
    }

    fn enums(&self) -> Vec<EnumBinding> {
        let members: Vec<(&'static str, i64)> = ActionType::ALL
            .iter()
            .map(|t| (t.name(), *t as i64))
            .collect();
        vec![EnumBinding::new("ActionType", &members)]
    }
}

/// Host that performs nothing and logs every request
///
/// Used by the command-line runner to dry-run macros.
#[derive(Debug, Default)]
pub struct TracingActionHost;

impl ActionHost for TracingActionHost {
    fn use_action(&self, action_type: ActionType, action_id: u32) -> bool {
        tracing::info!("use_action {:?} {}", action_type, action_id);
        true
    }

    fn teleport(&self, destination_id: u32) -> bool {
        tracing::info!("teleport {}", destination_id);
        true
    }

    fn cancel_cast(&self) {
        tracing::info!("cancel_cast");
    }

    fn limit_break(&self) -> LimitBreakStatus {
        LimitBreakStatus::default()
    }

    fn action_info(&self, action_id: u32) -> Option<ActionInfo> {
        tracing::info!("action_info {}", action_id);
        None
    }
}
