// src/script.rs

//! Scriptlet sandbox
//!
//! Package hooks run inside an embedded Lua interpreter, never the host
//! shell. Each script executes in a fresh environment exposing only a
//! whitelist of the standard library plus an `aurora` table with `info` and
//! `warn` functions that route into the engine's logger. The target root is
//! passed as the script's first argument. An uncaught Lua error or a
//! compilation failure signals scriptlet failure.

use crate::error::{Error, Result};
use mlua::{Lua, Table, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Globals copied into every script's environment
const WHITELIST: &[&str] = &[
    "print", "ipairs", "pairs", "next", "tostring", "tonumber", "type", "string", "table", "math",
];

/// Embedded Lua sandbox for package hooks
pub struct ScriptSandbox {
    lua: Lua,
}

impl ScriptSandbox {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        Ok(Self { lua })
    }

    /// Build the restricted environment table for one script run
    fn build_env(&self) -> mlua::Result<Table> {
        let env = self.lua.create_table()?;
        let globals = self.lua.globals();

        for name in WHITELIST {
            let value: Value = globals.get(*name)?;
            env.set(*name, value)?;
        }

        let aurora = self.lua.create_table()?;
        aurora.set(
            "info",
            self.lua.create_function(|_, msg: String| {
                info!(target: "scriptlet", "{msg}");
                Ok(())
            })?,
        )?;
        aurora.set(
            "warn",
            self.lua.create_function(|_, msg: String| {
                warn!(target: "scriptlet", "{msg}");
                Ok(())
            })?,
        )?;
        env.set("aurora", aurora)?;

        Ok(env)
    }

    /// Run a script from source, passing the target root as its first
    /// argument
    pub fn run(&self, source: &str, name: &str, target_root: &Path) -> Result<()> {
        let run_inner = || -> mlua::Result<()> {
            let env = self.build_env()?;
            let func = self
                .lua
                .load(source)
                .set_name(name)
                .set_environment(env)
                .into_function()?;
            func.call::<_, ()>(target_root.to_string_lossy().into_owned())
        };

        run_inner().map_err(|e| Error::ScriptletFailed(format!("{name}: {e}")))
    }

    /// Run a script from a file on disk
    pub fn run_file(&self, script_path: &Path, target_root: &Path) -> Result<()> {
        let source = fs::read_to_string(script_path).map_err(|e| {
            Error::ScriptletFailed(format!(
                "cannot read script {}: {e}",
                script_path.display()
            ))
        })?;
        let name = script_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| script_path.display().to_string());
        self.run(&source, &name, target_root)
    }
}
