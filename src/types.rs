//! NewType wrappers and small value types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier used when the caller configured no scripts at all.
pub const DEFAULT_SCRIPT_NAME: &str = "server.init";

/// Extensions tried, in order, when resolving a script identifier to a file.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".cjs", ".mjs", ".ts"];

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Name of an initialization script as written in the configuration
    /// (e.g., "server.init", "scripts/db-check").
    ///
    /// The name is resolved against the project root and the extension list;
    /// it is not required to carry an extension itself.
    ScriptName
);

impl ScriptName {
    /// The implicit identifier used when nothing was configured.
    pub fn default_script() -> Self {
        Self::new(DEFAULT_SCRIPT_NAME)
    }
}

/// A script identifier paired with the absolute path it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedScript {
    pub name: ScriptName,
    pub path: PathBuf,
}

impl ResolvedScript {
    pub fn new(name: ScriptName, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }
}
