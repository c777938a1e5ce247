//! Plan document parsing
//!
//! Both formats produce the same [`PipelineDefinition`]; nothing is
//! validated here beyond the document's shape.

use conveyor_core::PipelineDefinition;
use mlua::prelude::*;

use crate::error::LoadError;

/// Evaluates a plan script in `lua` and reads the table it returns
///
/// `chunk_name` shows up in Lua error messages and should identify the
/// script, usually its path.
pub fn parse_lua(lua: &Lua, source: &str, chunk_name: &str) -> Result<PipelineDefinition, LoadError> {
    let value: LuaValue = lua
        .load(source)
        .set_name(format!("@{}", chunk_name))
        .eval()
        .map_err(|e| LoadError::Script(e.to_string()))?;

    if !value.is_table() {
        return Err(LoadError::NotATable(value.type_name()));
    }

    lua.from_value(value)
        .map_err(|e| LoadError::Malformed(e.to_string()))
}

pub fn parse_json(source: &str) -> Result<PipelineDefinition, LoadError> {
    Ok(serde_json::from_str(source)?)
}
