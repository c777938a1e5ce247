//! `env` module: read-only access to loader variables
//!
//! Plan scripts never see the process environment directly. The loader
//! decides which variables exist (typically from `--var KEY=VALUE` flags)
//! and exposes them through a [`VarProvider`].

use crate::module::PlanModule;
use mlua::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of variables visible to plan scripts
pub trait VarProvider: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// All variable names, sorted
    fn keys(&self) -> Vec<String>;
}

/// Variables held in a map
#[derive(Debug, Clone, Default)]
pub struct MapVarProvider {
    vars: HashMap<String, String>,
}

impl MapVarProvider {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl VarProvider for MapVarProvider {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.vars.keys().cloned().collect();
        keys.sort();
        keys
    }
}

pub struct EnvModule<V: VarProvider> {
    provider: Arc<V>,
}

impl<V: VarProvider> EnvModule<V> {
    pub fn new(provider: V) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl<V: VarProvider + 'static> PlanModule for EnvModule<V> {
    fn id(&self) -> &'static str {
        "env"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let env = lua.create_table()?;

        let provider = Arc::clone(&self.provider);
        env.set(
            "get",
            lua.create_function(move |_, (name, default): (String, Option<String>)| {
                Ok(provider.get(&name).or(default))
            })?,
        )?;

        let provider = Arc::clone(&self.provider);
        env.set(
            "require",
            lua.create_function(move |_, name: String| {
                provider.get(&name).ok_or_else(|| {
                    LuaError::RuntimeError(format!("variable '{}' is required but not set", name))
                })
            })?,
        )?;

        let provider = Arc::clone(&self.provider);
        env.set(
            "has",
            lua.create_function(move |_, name: String| Ok(provider.get(&name).is_some()))?,
        )?;

        let provider = Arc::clone(&self.provider);
        env.set(
            "keys",
            lua.create_function(move |lua, ()| lua.create_sequence_from(provider.keys()))?,
        )?;

        lua.globals().set(self.id(), env)
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Variables passed to the loader (`conveyor run --var KEY=VALUE`)
---@class env
env = {}

---Value of a variable, or `default` when it is not set
---@param name string
---@param default? string
---@return string?
function env.get(name, default) end

---Value of a variable; loading fails when it is not set
---@param name string
---@return string
function env.require(name) end

---@param name string
---@return boolean
function env.has(name) end

---Sorted variable names
---@return string[]
function env.keys() end
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua_with(vars: &[(&str, &str)]) -> Lua {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lua = Lua::new();
        EnvModule::new(MapVarProvider::new(vars))
            .register(&lua)
            .unwrap();
        lua
    }

    #[test]
    fn test_get_with_default() {
        let lua = lua_with(&[("BRANCH", "main")]);

        let value: String = lua.load(r#"return env.get("BRANCH")"#).eval().unwrap();
        assert_eq!(value, "main");

        let value: String = lua
            .load(r#"return env.get("MISSING", "fallback")"#)
            .eval()
            .unwrap();
        assert_eq!(value, "fallback");

        let value: Option<String> = lua.load(r#"return env.get("MISSING")"#).eval().unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_require() {
        let lua = lua_with(&[("DATABASE_URL", "postgres://localhost/app")]);

        let value: String = lua
            .load(r#"return env.require("DATABASE_URL")"#)
            .eval()
            .unwrap();
        assert_eq!(value, "postgres://localhost/app");

        let err = lua
            .load(r#"return env.require("MISSING")"#)
            .eval::<String>()
            .unwrap_err();
        assert!(err.to_string().contains("'MISSING' is required"));
    }

    #[test]
    fn test_has_and_keys() {
        let lua = lua_with(&[("B", "2"), ("A", "1")]);

        let has: bool = lua.load(r#"return env.has("A")"#).eval().unwrap();
        assert!(has);
        let has: bool = lua.load(r#"return env.has("C")"#).eval().unwrap();
        assert!(!has);

        let keys: Vec<String> = lua.load("return env.keys()").eval().unwrap();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_stubs() {
        let stubs = EnvModule::new(MapVarProvider::default()).stubs();
        assert!(stubs.starts_with("---@meta"));
        for function in ["env.get", "env.require", "env.has", "env.keys"] {
            assert!(stubs.contains(function), "missing {}", function);
        }
    }
}
