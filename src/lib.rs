// Core modules
mod config;
mod error;
mod logging;
mod result;
mod stores;
mod types;

// Collaborators
pub mod loader;
pub mod resolver;

mod orchestrator;

// Re-export key types and functions
pub use config::{
    Arrayable, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, RawServerInitOptions, ScriptSelection,
    ServerInitOptions, load_options, resolve_config_path,
};
pub use error::{ServerInitError, ServerInitResult};
pub use logging::{InitLogger, LOG_TARGET, Verbosity};
pub use result::{RESULT_EXPORT, ScriptResult};
pub use stores::{ConfigStores, PUBLIC_KEY, shallow_merge};
pub use types::{DEFAULT_EXTENSIONS, DEFAULT_SCRIPT_NAME, ResolvedScript, ScriptName};

pub use loader::{ExtensionLoader, JsonModuleLoader, ModuleExports, ModuleLoader, NodeModuleLoader};
pub use orchestrator::{InitOrchestrator, InitReport, MergeTarget, ScriptReport, ScriptState};
pub use resolver::{FsPathResolver, PathResolver};

/// Convenience entry point for a host's startup hook.
///
/// Resolves scripts on disk under `options.root_dir`, runs them through the
/// Node-backed loader and merges their fragments into `stores`. An error
/// means the host must not start serving.
pub async fn run_server_init(
    options: ServerInitOptions,
    stores: &mut ConfigStores,
) -> ServerInitResult<InitReport> {
    let orchestrator = InitOrchestrator::from_options(options)?;
    orchestrator.run(stores).await
}
