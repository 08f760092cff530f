use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};

use crate::types::{DEFAULT_EXTENSIONS, ScriptName};

/// Environment variable pointing at the configuration document.
pub const CONFIG_ENV_VAR: &str = "SERVER_INIT_CONFIG";

/// File looked up in the working directory when the env var is unset.
pub const DEFAULT_CONFIG_FILE: &str = "server-init.json";

#[derive(Debug, Default, Deserialize)]
pub struct ServerInitJsonConfig {
    #[serde(rename = "serverInit", default)]
    pub server_init: RawServerInitOptions,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawServerInitOptions {
    #[serde(default)]
    pub scripts: Option<Arrayable>,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    pub root_dir: Option<String>,
    #[serde(default)]
    pub node_command: Option<Vec<String>>,
    #[serde(default)]
    pub typescript_command: Option<Vec<String>>,
}

/// A single script name or an ordered list of them.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Arrayable {
    One(String),
    Many(Vec<String>),
}

/// Which scripts the caller asked for.
///
/// `Default` means nothing was configured: the well-known default script is
/// tried and its absence is not an error. `Explicit` means every entry is
/// mandatory, even when it happens to equal the default name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScriptSelection {
    #[default]
    Default,
    Explicit(Vec<ScriptName>),
}

impl ScriptSelection {
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScriptName>,
    {
        Self::Explicit(names.into_iter().map(Into::into).collect())
    }

    /// Ordered list of identifiers to resolve.
    pub fn names(&self) -> Vec<ScriptName> {
        match self {
            Self::Default => vec![ScriptName::default_script()],
            Self::Explicit(names) => names.clone(),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Normalized options for one initialization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInitOptions {
    pub scripts: ScriptSelection,
    /// Suppress info and success logging; warnings and errors are kept.
    pub silent: bool,
    pub extensions: Vec<String>,
    /// Directory relative script names are resolved against.
    pub root_dir: PathBuf,
    /// Program plus leading arguments used to evaluate JavaScript modules.
    pub node_command: Vec<String>,
    /// Program plus leading arguments used to evaluate TypeScript modules.
    pub typescript_command: Vec<String>,
}

impl Default for ServerInitOptions {
    fn default() -> Self {
        Self {
            scripts: ScriptSelection::Default,
            silent: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            root_dir: PathBuf::from("."),
            node_command: vec!["node".to_string()],
            typescript_command: vec![
                "node".to_string(),
                "--import".to_string(),
                "tsx".to_string(),
            ],
        }
    }
}

impl ServerInitOptions {
    pub fn with_scripts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScriptName>,
    {
        self.scripts = ScriptSelection::explicit(names);
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn from_raw(raw: RawServerInitOptions) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let scripts = match raw.scripts {
            None => ScriptSelection::Default,
            Some(Arrayable::One(name)) => ScriptSelection::explicit([expand_env_vars(&name)]),
            Some(Arrayable::Many(names)) => {
                ScriptSelection::explicit(names.iter().map(|n| expand_env_vars(n)))
            }
        };

        let extensions = match raw.extensions {
            Some(exts) => {
                if let Some(bad) = exts.iter().find(|e| !e.starts_with('.')) {
                    return Err(anyhow::anyhow!(
                        "Extension `{}` must start with a dot",
                        bad
                    ));
                }
                exts
            }
            None => defaults.extensions,
        };

        let node_command = non_empty_command("nodeCommand", raw.node_command)?
            .unwrap_or(defaults.node_command);
        let typescript_command = non_empty_command("typescriptCommand", raw.typescript_command)?
            .unwrap_or(defaults.typescript_command);

        let root_dir = raw
            .root_dir
            .map(|dir| PathBuf::from(expand_env_vars(&dir)))
            .unwrap_or(defaults.root_dir);

        Ok(Self {
            scripts,
            silent: raw.silent,
            extensions,
            root_dir,
            node_command,
            typescript_command,
        })
    }

    /// Parse a configuration document of the form `{ "serverInit": { ... } }`.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: ServerInitJsonConfig = serde_json::from_str(raw)?;
        Self::from_raw(cfg.server_init)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Could not read {}: {}", path.display(), e))?;
        Self::from_json_str(&raw)
    }
}

fn non_empty_command(
    field: &str,
    command: Option<Vec<String>>,
) -> anyhow::Result<Option<Vec<String>>> {
    match command {
        Some(cmd) if cmd.is_empty() => Err(anyhow::anyhow!("`{}` must not be empty", field)),
        Some(cmd) => Ok(Some(cmd.into_iter().map(|a| expand_env_vars(&a)).collect())),
        None => Ok(None),
    }
}

/// Locate the configuration document, if any.
///
/// `SERVER_INIT_CONFIG` wins; otherwise `./server-init.json` is used when it
/// exists. `None` means run with defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

pub fn load_options() -> anyhow::Result<ServerInitOptions> {
    match resolve_config_path() {
        Some(path) => ServerInitOptions::load(&path),
        None => Ok(ServerInitOptions::default()),
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
