//! Loading script modules and reading their exports.
//!
//! A loader returns the module namespace as a JSON object. The orchestrator
//! only looks at the `result` key; everything else is ignored.

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::ServerInitOptions;

/// Exported names of a loaded module mapped to their (awaited) values.
pub type ModuleExports = Map<String, Value>;

/// Prefix of the stdout line carrying the serialized exports.
pub const RESULT_MARKER: &str = "__SERVER_INIT_RESULT__";

/// Evaluated by the Node runtime with the module path as its only argument.
///
/// Imports the module, awaits `result` (falling back to `default.result` for
/// CommonJS interop) and prints one marker line with the JSON exports. The
/// process exits once that line is flushed, so handles the script leaves open
/// (pools, sockets, timers) cannot keep it alive.
const NODE_BOOTSTRAP: &str = r#"
const { pathToFileURL } = require('node:url');
import(pathToFileURL(process.argv[1]).href)
  .then(async (mod) => {
    const exported = mod.result !== undefined ? mod.result : (mod.default ? mod.default.result : undefined);
    const result = await exported;
    const line = '\n__SERVER_INIT_RESULT__' + JSON.stringify({ result }) + '\n';
    process.stdout.write(line, () => process.exit(0));
  })
  .catch((err) => {
    console.error(err && err.stack ? err.stack : String(err));
    process.exit(1);
  });
"#;

/// Loads the module at an absolute path.
pub trait ModuleLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<ModuleExports>> + Send + 'a>>;
}

/// Reads a static JSON document whose top-level object is the module namespace.
#[derive(Debug, Clone, Default)]
pub struct JsonModuleLoader;

impl ModuleLoader for JsonModuleLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<ModuleExports>> + Send + 'a>> {
        Box::pin(async move {
            let raw = tokio::fs::read_to_string(path).await?;
            match serde_json::from_str::<Value>(&raw)? {
                Value::Object(exports) => Ok(exports),
                _ => Err(anyhow!(
                    "{} must contain a JSON object of exports",
                    path.display()
                )),
            }
        })
    }
}

/// Evaluates a JavaScript or TypeScript module in a Node subprocess.
#[derive(Debug, Clone)]
pub struct NodeModuleLoader {
    command: Vec<String>,
}

impl NodeModuleLoader {
    /// `command` is the program followed by any leading arguments,
    /// e.g. `["node"]` or `["node", "--import", "tsx"]`.
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(anyhow!("Node runtime command must not be empty"));
        }
        Ok(Self { command })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn build_command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg("-e")
            .arg(NODE_BOOTSTRAP)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = path.parent() {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl ModuleLoader for NodeModuleLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<ModuleExports>> + Send + 'a>> {
        Box::pin(async move {
            let output = self
                .build_command(path)
                .output()
                .await
                .map_err(|e| anyhow!("Failed to spawn `{}`: {}", self.command[0], e))?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);

            if !output.status.success() {
                return Err(anyhow!(
                    "module exited with {}: {}",
                    output.status,
                    stderr.trim()
                ));
            }

            for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                tracing::debug!(script = %path.display(), "stderr: {}", line);
            }

            parse_node_output(path, &stdout)
        })
    }
}

/// Pick the exports out of the subprocess stdout.
///
/// Lines without the marker are the script's own output and are only logged.
/// If the marker appears more than once the last one wins.
fn parse_node_output(path: &Path, stdout: &str) -> Result<ModuleExports> {
    let mut exports = None;

    for line in stdout.lines() {
        if let Some(payload) = line.strip_prefix(RESULT_MARKER) {
            exports = Some(payload);
        } else if !line.trim().is_empty() {
            tracing::debug!(script = %path.display(), "{}", line);
        }
    }

    let payload = exports.ok_or_else(|| anyhow!("module produced no exports"))?;
    match serde_json::from_str::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("module exports were not an object")),
    }
}

/// Dispatches to a loader based on the file extension.
///
/// `.json` is read statically, `.ts`/`.mts`/`.cts` go through the TypeScript
/// runtime, everything else through plain Node.
pub struct ExtensionLoader {
    json: JsonModuleLoader,
    javascript: NodeModuleLoader,
    typescript: NodeModuleLoader,
}

impl ExtensionLoader {
    pub fn new(javascript: NodeModuleLoader, typescript: NodeModuleLoader) -> Self {
        Self {
            json: JsonModuleLoader,
            javascript,
            typescript,
        }
    }

    pub fn from_options(options: &ServerInitOptions) -> Result<Self> {
        Ok(Self::new(
            NodeModuleLoader::new(options.node_command.clone())?,
            NodeModuleLoader::new(options.typescript_command.clone())?,
        ))
    }

    fn loader_for(&self, path: &Path) -> &dyn ModuleLoader {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => &self.json,
            Some("ts" | "mts" | "cts") => &self.typescript,
            _ => &self.javascript,
        }
    }
}

impl ModuleLoader for ExtensionLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<ModuleExports>> + Send + 'a>> {
        self.loader_for(path).load(path)
    }
}
