use mlua::prelude::*;

/// A Lua module available to plan scripts.
///
/// Each module owns one global table, named by [`id`](PlanModule::id), and
/// can describe itself to the Lua language server through [`stubs`](PlanModule::stubs).
///
/// # Example
///
/// ```rust
/// use conveyor_lua::module::PlanModule;
/// use mlua::prelude::*;
///
/// struct Version;
///
/// impl PlanModule for Version {
///     fn id(&self) -> &'static str {
///         "version"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("current", "1.4.0")?;
///         lua.globals().set(self.id(), table)
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\n---@class version\nversion = {}\n".to_string()
///     }
/// }
/// ```
pub trait PlanModule: Send + Sync {
    /// Global name of the module table. Must be a valid Lua identifier.
    fn id(&self) -> &'static str;

    /// Installs the module's table into `lua`'s globals.
    ///
    /// # Errors
    /// Returns `LuaError` if any value cannot be created or set.
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// LuaLS definition file for the module, starting with `---@meta`.
    fn stubs(&self) -> String;
}

/// Ordered set of plan-script modules, keyed by id
///
/// Registering a module whose id is already present replaces the earlier one.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn PlanModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: PlanModule + 'static>(&mut self, module: M) {
        let id = module.id();
        self.modules.retain(|existing| existing.id() != id);
        self.modules.push(Box::new(module));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<M: PlanModule + 'static>(mut self, module: M) -> Self {
        self.register(module);
        self
    }

    pub fn get(&self, id: &str) -> Option<&dyn PlanModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    pub fn modules(&self) -> &[Box<dyn PlanModule>] {
        &self.modules
    }

    /// Registers every module into `lua`, stopping at the first failure
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        self.modules
            .iter()
            .try_for_each(|module| module.register(lua))
    }

    /// Concatenated stubs of all modules, in registration order
    pub fn generate_stubs(&self) -> String {
        self.modules
            .iter()
            .map(|module| module.stubs())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
