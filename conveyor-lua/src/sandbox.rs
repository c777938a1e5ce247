//! Lua sandbox for plan scripts
//!
//! Plan scripts only describe a pipeline. They get tables, strings and math,
//! plus whatever modules the caller registers; no I/O, no OS access and no
//! way to load other chunks from disk.

use crate::module::{ModuleRegistry, PlanModule};
use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};

/// Upper bound on memory a plan script may allocate
pub const PLAN_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Creates a restricted Lua state with every module in `registry` installed
///
/// # Example
/// ```
/// use conveyor_lua::module::ModuleRegistry;
/// use conveyor_lua::sandbox::{PipelineModule, create_sandbox};
///
/// let lua = create_sandbox(&ModuleRegistry::new().with(PipelineModule))?;
/// let stages: mlua::Table = lua
///     .load(r#"return pipeline.define({ stages = { "lint", "test" } }).stages"#)
///     .eval()?;
/// assert_eq!(stages.raw_len(), 2);
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox(registry: &ModuleRegistry) -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )?;
    lua.set_memory_limit(PLAN_MEMORY_LIMIT)?;

    let globals = lua.globals();
    for name in ["require", "dofile", "loadfile"] {
        globals.set(name, LuaNil)?;
    }

    registry.register_all(&lua)?;

    Ok(lua)
}

/// Helpers for writing plan tables: `define`, `stage`, `job`, `service`
/// and a fluent `builder`
pub struct PipelineModule;

impl PlanModule for PipelineModule {
    fn id(&self) -> &'static str {
        "pipeline"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let pipeline = lua.create_table()?;

        pipeline.set("define", lua.create_function(|_, plan: LuaTable| Ok(plan))?)?;
        pipeline.set("job", lua.create_function(|_, job: LuaTable| Ok(job))?)?;
        pipeline.set(
            "service",
            lua.create_function(|_, service: LuaTable| Ok(service))?,
        )?;
        pipeline.set(
            "stage",
            lua.create_function(|lua, (name, jobs): (String, Option<LuaTable>)| {
                let stage = lua.create_table()?;
                stage.set("name", name)?;
                stage.set("jobs", match jobs {
                    Some(jobs) => jobs,
                    None => lua.create_table()?,
                })?;
                Ok(stage)
            })?,
        )?;
        pipeline.set("builder", lua.create_function(|lua, ()| create_builder(lua))?)?;

        lua.globals().set(self.id(), pipeline)
    }

    fn stubs(&self) -> String {
        PIPELINE_STUBS.to_string()
    }
}

const PIPELINE_STUBS: &str = r#"---@meta

---@class JobDefinition
---@field name string
---@field stage? string Owning stage; required for jobs declared outside a stage
---@field command? string Shell command line
---@field script? string[] Shell lines, stopping at the first failure
---@field working_dir? string Relative to the plan file
---@field environment? table<string, string>
---@field allow_failure? boolean
---@field services? string[]
---@field timeout? integer Seconds

---@class StageDefinition
---@field name string
---@field jobs? JobDefinition[]

---@class ServiceDefinition
---@field name string
---@field description? string
---@field environment? table<string, string>
---@field depends_on? string[]

---@class PipelineDefinition
---@field name? string
---@field description? string
---@field stages (string|StageDefinition)[]
---@field jobs? JobDefinition[]
---@field variables? table<string, string>
---@field services? ServiceDefinition[]

---@class PipelineBuilder
local PipelineBuilder = {}

---@param name string
---@return PipelineBuilder
function PipelineBuilder:name(name) end

---@param description string
---@return PipelineBuilder
function PipelineBuilder:description(description) end

---@param key string
---@param value string
---@return PipelineBuilder
function PipelineBuilder:variable(key, value) end

---@param stage string|StageDefinition
---@return PipelineBuilder
function PipelineBuilder:stage(stage) end

---@param job JobDefinition
---@return PipelineBuilder
function PipelineBuilder:job(job) end

---@param service ServiceDefinition
---@return PipelineBuilder
function PipelineBuilder:service(service) end

---@return PipelineDefinition
function PipelineBuilder:build() end

---@class pipeline
pipeline = {}

---@param plan PipelineDefinition
---@return PipelineDefinition
function pipeline.define(plan) end

---@param name string
---@param jobs? JobDefinition[]
---@return StageDefinition
function pipeline.stage(name, jobs) end

---@param job JobDefinition
---@return JobDefinition
function pipeline.job(job) end

---@param service ServiceDefinition
---@return ServiceDefinition
function pipeline.service(service) end

---@return PipelineBuilder
function pipeline.builder() end
"#;

/// Appends `value` to the list stored under `key`, creating the list on first use
fn push(lua: &Lua, builder: &LuaTable, key: &str, value: LuaValue) -> LuaResult<()> {
    let list = match builder.raw_get::<Option<LuaTable>>(key)? {
        Some(list) => list,
        None => {
            let list = lua.create_table()?;
            builder.raw_set(key, list.clone())?;
            list
        }
    };
    list.raw_push(value)
}

fn create_builder(lua: &Lua) -> LuaResult<LuaTable> {
    let builder = lua.create_table()?;
    let methods = lua.create_table()?;

    for field in ["name", "description"] {
        methods.set(
            field,
            lua.create_function(move |_, (builder, value): (LuaTable, String)| {
                builder.raw_set(format!("_{}", field), value)?;
                Ok(builder)
            })?,
        )?;
    }

    methods.set(
        "variable",
        lua.create_function(|lua, (builder, key, value): (LuaTable, String, String)| {
            let variables = match builder.raw_get::<Option<LuaTable>>("_variables")? {
                Some(variables) => variables,
                None => {
                    let variables = lua.create_table()?;
                    builder.raw_set("_variables", variables.clone())?;
                    variables
                }
            };
            variables.raw_set(key, value)?;
            Ok(builder)
        })?,
    )?;

    for (method, list) in [("stage", "_stages"), ("job", "_jobs"), ("service", "_services")] {
        methods.set(
            method,
            lua.create_function(move |lua, (builder, value): (LuaTable, LuaValue)| {
                push(lua, &builder, list, value)?;
                Ok(builder)
            })?,
        )?;
    }

    methods.set(
        "build",
        lua.create_function(|lua, builder: LuaTable| {
            let plan = lua.create_table()?;
            for field in [
                "name",
                "description",
                "variables",
                "stages",
                "jobs",
                "services",
            ] {
                let value: LuaValue = builder.raw_get(format!("_{}", field))?;
                if !value.is_nil() {
                    plan.raw_set(field, value)?;
                }
            }
            Ok(plan)
        })?,
    )?;

    let metatable = lua.create_table()?;
    metatable.set("__index", methods)?;
    builder.set_metatable(Some(metatable))?;

    Ok(builder)
}
