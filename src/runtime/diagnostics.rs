//! Turn a failed script into one human-readable line
//!
//! Extraction never fails: plain error messages are returned verbatim, other
//! errors are located through `debug.getinfo` on the failed coroutine (the
//! copy captured at bind, since scripts never see `debug`), and
//! anything that goes wrong along the way yields [`GENERIC_ERROR_MESSAGE`].

use mlua::{Function, HookTriggers, Lua, Thread};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::runtime::snippets::ERROR_LOCATION_SNIPPET;

/// Returned when the location lookup itself fails
pub const GENERIC_ERROR_MESSAGE: &str = "Failed to get script error details";

/// Named registry slot holding `debug.getinfo` while a session is bound
pub(crate) const GETINFO_REGISTRY_KEY: &str = "arc.debug.getinfo";

/// Instructions the location lookup may execute before it is abandoned
const EXTRACTION_INSTRUCTION_BUDGET: u32 = 100_000;

/// Describe `error`, raised by `thread` when it is known
pub fn extract_error_details(lua: &Lua, thread: Option<&Thread>, error: &mlua::Error) -> String {
    if let Some(message) = plain_message(error) {
        return message.to_string();
    }

    let located = catch_unwind(AssertUnwindSafe(|| locate_error(lua, thread)));
    match located {
        Ok(Ok(line)) if !line.trim().is_empty() => line,
        Ok(Ok(_)) => GENERIC_ERROR_MESSAGE.to_string(),
        Ok(Err(e)) => {
            tracing::debug!("Error location lookup failed: {}", e);
            GENERIC_ERROR_MESSAGE.to_string()
        }
        Err(_) => {
            tracing::debug!("Error location lookup panicked");
            GENERIC_ERROR_MESSAGE.to_string()
        }
    }
}

/// The textual message carried by `error`, looking through callback wrappers
fn plain_message(error: &mlua::Error) -> Option<&str> {
    match error {
        mlua::Error::RuntimeError(message) | mlua::Error::MemoryError(message)
            if !message.trim().is_empty() =>
        {
            Some(message)
        }
        mlua::Error::SyntaxError { message, .. } if !message.trim().is_empty() => Some(message),
        mlua::Error::CallbackError { cause, .. } => plain_message(cause),
        _ => None,
    }
}

fn locate_error(lua: &Lua, thread: Option<&Thread>) -> mlua::Result<String> {
    let getinfo: Option<Function> = lua.named_registry_value(GETINFO_REGISTRY_KEY)?;

    lua.set_hook(
        HookTriggers::new().every_nth_instruction(EXTRACTION_INSTRUCTION_BUDGET),
        |_lua, _debug| {
            Err(mlua::Error::RuntimeError(
                "error location lookup exceeded its instruction budget".into(),
            ))
        },
    );

    let result = lua
        .load(ERROR_LOCATION_SNIPPET)
        .set_name("=arc:diagnostics")
        .call::<String>((thread.cloned(), getinfo));

    lua.remove_hook();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_runtime_message_returned_verbatim() {
        let lua = Lua::new();
        let err = mlua::Error::RuntimeError("boom at line 3".into());
        assert_eq!(extract_error_details(&lua, None, &err), "boom at line 3");
    }

    #[test]
    fn test_callback_wrapper_unwrapped() {
        let lua = Lua::new();
        let err = mlua::Error::CallbackError {
            traceback: "stack traceback:".into(),
            cause: Arc::new(mlua::Error::RuntimeError("inner".into())),
        };
        assert_eq!(extract_error_details(&lua, None, &err), "inner");
    }

    #[test]
    fn test_non_text_error_without_thread() {
        let lua = Lua::new();
        let err = mlua::Error::external("host failure");
        assert_eq!(extract_error_details(&lua, None, &err), "Unknown error location");
    }

    #[test]
    fn test_missing_debug_library_gives_generic_message() {
        // Lua::new() does not load the debug library
        let lua = Lua::new();
        let thread = lua
            .create_thread(lua.load("return 1").into_function().unwrap())
            .unwrap();
        let err = mlua::Error::external("host failure");
        assert_eq!(
            extract_error_details(&lua, Some(&thread), &err),
            GENERIC_ERROR_MESSAGE
        );
    }

    #[test]
    fn test_captured_getinfo_used_without_debug_global() {
        let lua = Lua::new();
        let getinfo = lua
            .create_function(|lua, ()| {
                let info = lua.create_table()?;
                info.set("what", "Lua")?;
                info.set("source", "@macro")?;
                info.set("currentline", 4)?;
                info.set("name", "step")?;
                Ok(info)
            })
            .unwrap();
        lua.set_named_registry_value(GETINFO_REGISTRY_KEY, getinfo)
            .unwrap();
        let thread = lua
            .create_thread(lua.load("return 1").into_function().unwrap())
            .unwrap();

        let err = mlua::Error::external("host failure");
        assert_eq!(
            extract_error_details(&lua, Some(&thread), &err),
            "Error at macro:4 in function 'step'"
        );
    }
}
