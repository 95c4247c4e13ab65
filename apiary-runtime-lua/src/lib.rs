//! Apiary Lua Runtime
//!
//! Runs scripted filter predicates on LuaJIT via mlua. A script defines a global
//! `main(args)` function; `args` is a table built from the event's options
//! (strings, numbers, booleans, lists and maps convert recursively). The return
//! value decides the filter: `nil`, `false`, `0`, `""` and empty tables are false,
//! anything else is true.
//!
//! Every evaluation runs in a fresh Lua state, so scripts cannot leak state into
//! each other.

use apiary_schema::{Value, ValueMap};
use mlua::{Function, HookTriggers, Lua, Table};
use thiserror::Error;
use tracing::{debug, trace};

/// Name of the function a filter script must define
pub const ENTRY_POINT: &str = "main";

/// Maximum nesting depth when converting values into and out of Lua
const MAX_CONVERSION_DEPTH: usize = 32;

/// Globals removed from the script environment in sandbox mode
const SANDBOXED_GLOBALS: &[&str] = &[
    "os", "io", "debug", "require", "package", "dofile", "loadfile", "load",
];

/// Lua runtime configuration
#[derive(Debug, Clone)]
pub struct LuaConfig {
    /// Maximum memory per Lua state (in MB); ignored where the allocator is not controllable
    pub max_memory_mb: usize,

    /// Instruction limit for a single evaluation
    pub instruction_limit: Option<u32>,

    /// Remove filesystem, process and module-loading globals
    pub sandbox: bool,
}

impl Default for LuaConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 16,
            instruction_limit: Some(1_000_000),
            sandbox: true,
        }
    }
}

/// Lua runtime errors
#[derive(Debug, Error)]
pub enum LuaRuntimeError {
    #[error("Failed to load Lua script {name}: {message}")]
    LoadError { name: String, message: String },

    #[error("Execution error in {name}: {message}")]
    ExecutionError { name: String, message: String },

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Value conversion error: {0}")]
    Conversion(String),
}

/// Lua script engine
#[derive(Debug, Clone, Default)]
pub struct LuaEngine {
    config: LuaConfig,
}

impl LuaEngine {
    /// Create a new Lua engine
    pub fn new(config: LuaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LuaConfig {
        &self.config
    }

    /// Run `main(args)` and report whether its result is truthy
    pub fn evaluate(
        &self,
        name: &str,
        script: &str,
        args: &ValueMap,
    ) -> Result<bool, LuaRuntimeError> {
        let result = self.call(name, script, args)?;
        let passed = result.is_truthy();
        trace!(script = name, passed, "Lua predicate evaluated");
        Ok(passed)
    }

    /// Run `main(args)` and return its result
    pub fn call(
        &self,
        name: &str,
        script: &str,
        args: &ValueMap,
    ) -> Result<Value, LuaRuntimeError> {
        let lua = self.new_state(name)?;

        lua.load(script)
            .set_name(name)
            .exec()
            .map_err(|e| LuaRuntimeError::LoadError {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let main: Function = lua
            .globals()
            .get(ENTRY_POINT)
            .map_err(|_| LuaRuntimeError::FunctionNotFound(ENTRY_POINT.to_string()))?;

        let table = map_to_table(&lua, args, 0)
            .map_err(|e| LuaRuntimeError::Conversion(e.to_string()))?;

        if let Some(limit) = self.config.instruction_limit {
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(limit),
                move |_lua, _debug| {
                    Err(mlua::Error::RuntimeError(format!(
                        "instruction limit exceeded ({})",
                        limit
                    )))
                },
            )
            .map_err(|e| LuaRuntimeError::LoadError {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        }

        let result = main
            .call::<mlua::Value>(table)
            .map_err(|e| LuaRuntimeError::ExecutionError {
                name: name.to_string(),
                message: e.to_string(),
            });
        lua.remove_hook();

        from_lua(&result?, 0)
    }

    /// Check that a script loads and defines the entry point
    pub fn validate(&self, name: &str, script: &str) -> Result<(), LuaRuntimeError> {
        let lua = self.new_state(name)?;
        lua.load(script)
            .set_name(name)
            .exec()
            .map_err(|e| LuaRuntimeError::LoadError {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        lua.globals()
            .get::<Function>(ENTRY_POINT)
            .map_err(|_| LuaRuntimeError::FunctionNotFound(ENTRY_POINT.to_string()))?;
        Ok(())
    }

    fn new_state(&self, name: &str) -> Result<Lua, LuaRuntimeError> {
        let lua = Lua::new();

        if let Err(e) = lua.set_memory_limit(self.config.max_memory_mb * 1024 * 1024) {
            debug!(script = name, error = %e, "Lua memory limit not applied");
        }

        // Count hooks do not fire inside JIT-compiled traces
        if self.config.instruction_limit.is_some() {
            lua.load("if jit then jit.off() end")
                .exec()
                .map_err(|e| LuaRuntimeError::LoadError {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
        }

        if self.config.sandbox {
            let globals = lua.globals();
            for global in SANDBOXED_GLOBALS {
                globals
                    .set(*global, mlua::Value::Nil)
                    .map_err(|e| LuaRuntimeError::LoadError {
                        name: name.to_string(),
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(lua)
    }
}

fn map_to_table(lua: &Lua, map: &ValueMap, depth: usize) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (key, value) in map {
        table.set(key.as_str(), to_lua(lua, value, depth + 1)?)?;
    }
    Ok(table)
}

fn to_lua(lua: &Lua, value: &Value, depth: usize) -> mlua::Result<mlua::Value> {
    if depth > MAX_CONVERSION_DEPTH {
        return Err(mlua::Error::RuntimeError(
            "value nesting too deep".to_string(),
        ));
    }
    Ok(match value {
        Value::Null => mlua::Value::Nil,
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::Int(v) => mlua::Value::Integer(*v as mlua::Integer),
        Value::Float(v) => mlua::Value::Number(*v),
        Value::String(s) => mlua::Value::String(lua.create_string(s)?),
        Value::List(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, to_lua(lua, item, depth + 1)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Map(map) => mlua::Value::Table(map_to_table(lua, map, depth)?),
    })
}

fn from_lua(value: &mlua::Value, depth: usize) -> Result<Value, LuaRuntimeError> {
    if depth > MAX_CONVERSION_DEPTH {
        return Err(LuaRuntimeError::Conversion(
            "result nesting too deep".to_string(),
        ));
    }
    let convert = |e: mlua::Error| LuaRuntimeError::Conversion(e.to_string());

    Ok(match value {
        mlua::Value::Nil => Value::Null,
        mlua::Value::Boolean(b) => Value::Bool(*b),
        mlua::Value::Integer(v) => Value::Int(*v as i64),
        mlua::Value::Number(v) => Value::Float(*v),
        mlua::Value::String(s) => Value::String(s.to_str().map_err(convert)?.to_string()),
        mlua::Value::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut items = Vec::with_capacity(len);
                for i in 1..=len {
                    let item: mlua::Value = table.raw_get(i).map_err(convert)?;
                    items.push(from_lua(&item, depth + 1)?);
                }
                Value::List(items)
            } else {
                let mut map = ValueMap::new();
                for pair in table.pairs::<mlua::Value, mlua::Value>() {
                    let (key, item) = pair.map_err(convert)?;
                    let key = match key {
                        mlua::Value::String(s) => s.to_str().map_err(convert)?.to_string(),
                        other => from_lua(&other, depth + 1)?.to_string(),
                    };
                    map.insert(key, from_lua(&item, depth + 1)?);
                }
                Value::Map(map)
            }
        }
        // Functions, userdata and threads have no data form; they count as true
        _ => Value::Bool(true),
    })
}
