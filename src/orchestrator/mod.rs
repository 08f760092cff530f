//! Startup orchestration: resolve the configured init scripts, run them one
//! after another, and merge what they return into the host's config stores.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::ServerInitOptions;
use crate::error::{ServerInitError, ServerInitResult};
use crate::loader::{ExtensionLoader, ModuleLoader};
use crate::logging::{InitLogger, Verbosity};
use crate::resolver::{FsPathResolver, PathResolver};
use crate::result::{RESULT_EXPORT, ScriptResult};
use crate::stores::ConfigStores;
use crate::types::{ResolvedScript, ScriptName};

#[cfg(test)]
mod integration_tests;

/// Lifecycle of a single script.
///
/// `FailedHalt` ends the whole run; the other terminal states move on to the
/// next script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptState {
    Pending,
    Loaded,
    PassedMerged,
    FailedContinue,
    FailedHalt,
}

/// Which store a script wrote into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeTarget {
    RuntimeConfig,
    PublicConfig,
    AppConfig,
}

/// Outcome of one script that did not halt the run.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub name: ScriptName,
    pub path: std::path::PathBuf,
    pub state: ScriptState,
    pub merged: Vec<MergeTarget>,
    pub duration_ms: u64,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scripts: Vec<ScriptReport>,
}

impl InitReport {
    pub fn passed(&self) -> usize {
        self.count(ScriptState::PassedMerged)
    }

    pub fn failed(&self) -> usize {
        self.count(ScriptState::FailedContinue)
    }

    fn count(&self, state: ScriptState) -> usize {
        self.scripts.iter().filter(|s| s.state == state).count()
    }
}

/// Runs server initialization scripts before the host starts serving.
///
/// Must not be invoked concurrently with itself: the stores are mutated
/// without locking and merge order has to follow declaration order.
pub struct InitOrchestrator {
    options: ServerInitOptions,
    resolver: Arc<dyn PathResolver>,
    loader: Arc<dyn ModuleLoader>,
    logger: InitLogger,
}

impl InitOrchestrator {
    pub fn new(
        options: ServerInitOptions,
        resolver: Arc<dyn PathResolver>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        let logger = InitLogger::new(Verbosity::from_silent(options.silent));
        Self {
            options,
            resolver,
            loader,
            logger,
        }
    }

    /// Wire the filesystem resolver and the extension-dispatching loader.
    pub fn from_options(options: ServerInitOptions) -> ServerInitResult<Self> {
        let resolver = Arc::new(FsPathResolver::new(options.root_dir.clone()));
        let loader = Arc::new(
            ExtensionLoader::from_options(&options)
                .map_err(|e| ServerInitError::Config(e.to_string()))?,
        );
        Ok(Self::new(options, resolver, loader))
    }

    pub fn options(&self) -> &ServerInitOptions {
        &self.options
    }

    /// Resolve every configured identifier, in order.
    ///
    /// An unresolved default script yields an empty list. An unresolved
    /// explicit script fails the whole phase, even if others resolved.
    pub async fn resolve_scripts(&self) -> ServerInitResult<Vec<ResolvedScript>> {
        self.logger.info("Checking if there are any server initialization scripts to run");

        let selection = &self.options.scripts;
        let mut resolved = Vec::new();

        for name in selection.names() {
            let path = self
                .resolver
                .resolve(&name, &self.options.extensions)
                .await
                .map_err(|e| {
                    ServerInitError::Internal(format!("Failed to resolve {}: {}", name, e))
                })?;

            match path {
                Some(path) => {
                    self.logger
                        .info(format!("Found script file at: {}", path.display()));
                    resolved.push(ResolvedScript::new(name, path));
                }
                None if selection.is_default() => {
                    self.logger.warn(
                        "No default script file found and no additional scripts declared, \
                         continuing without running server initialization scripts.",
                    );
                    self.logger.info(format!(
                        "To run server initialization scripts, create a file in the project root \
                         called {} with one of the extensions {} or list scripts under serverInit.scripts.",
                        name,
                        self.options.extensions.join(", ")
                    ));
                    return Ok(Vec::new());
                }
                None => {
                    self.logger.warn(format!(
                        "A script called {} was configured for server initialization, but the file \
                         was not found. Check that the file exists, or remove it from serverInit.scripts.",
                        name
                    ));
                    return Err(ServerInitError::ScriptNotFound(name));
                }
            }
        }

        Ok(resolved)
    }

    /// Load one script, interpret its result and merge its fragments.
    ///
    /// Returns the report for `PassedMerged` and `FailedContinue`; a halting
    /// failure or a load problem comes back as an error.
    pub async fn run_script(
        &self,
        script: &ResolvedScript,
        stores: &mut ConfigStores,
    ) -> ServerInitResult<ScriptReport> {
        let started = Instant::now();
        let name = &script.name;
        tracing::debug!(script = %name, state = ?ScriptState::Pending, "script state");

        self.logger.info(format!("Running script: {}", name));

        let exports = self.loader.load(&script.path).await.map_err(|e| {
            self.logger
                .error(format!("Could not load script {}: {}", name, e));
            ServerInitError::LoadFailed {
                script: name.clone(),
                reason: e.to_string(),
            }
        })?;

        let result = ScriptResult::from_export(exports.get(RESULT_EXPORT)).map_err(|reason| {
            self.logger
                .error(format!("Script {} returned a malformed result: {}", name, reason));
            ServerInitError::MalformedResult {
                script: name.clone(),
                reason,
            }
        })?;
        tracing::debug!(script = %name, state = ?ScriptState::Loaded, pass = result.pass, "script state");

        let mut report = ScriptReport {
            name: name.clone(),
            path: script.path.clone(),
            state: ScriptState::Loaded,
            merged: Vec::new(),
            duration_ms: 0,
        };

        if !result.pass {
            if result.may_continue() {
                self.logger.warn(format!(
                    "{} server initialization script failed but continueOnFail was set to true, \
                     continuing to run scripts",
                    name
                ));
                report.state = ScriptState::FailedContinue;
                report.duration_ms = started.elapsed().as_millis() as u64;
                return Ok(report);
            }

            self.logger.warn(format!(
                "{} server initialization script failed and continueOnFail was not set to true, \
                 stopping further scripts and halting server launch.",
                name
            ));
            tracing::debug!(script = %name, state = ?ScriptState::FailedHalt, "script state");
            return Err(ServerInitError::ScriptFailed(name.clone()));
        }

        if let Some(fragment) = result.runtime_config {
            self.logger
                .info(format!("Merging new config from {} into runtimeConfig", name));
            stores.merge_runtime(fragment);
            report.merged.push(MergeTarget::RuntimeConfig);
        }
        if let Some(fragment) = result.public_config {
            self.logger.info(format!(
                "Merging new config from {} into runtimeConfig.public",
                name
            ));
            stores.merge_public(fragment);
            report.merged.push(MergeTarget::PublicConfig);
        }
        if let Some(fragment) = result.app_config {
            self.logger
                .info(format!("Merging new config from {} into appConfig", name));
            stores.merge_app(fragment);
            report.merged.push(MergeTarget::AppConfig);
        }

        self.logger.success(format!("{} script ran successfully", name));

        report.state = ScriptState::PassedMerged;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Resolve and run every configured script, strictly in order.
    ///
    /// Merges already applied by earlier scripts are kept when a later one
    /// halts the run.
    pub async fn run(&self, stores: &mut ConfigStores) -> ServerInitResult<InitReport> {
        let started_at = Utc::now();
        let scripts = self.resolve_scripts().await?;

        let mut reports = Vec::with_capacity(scripts.len());
        for script in &scripts {
            reports.push(self.run_script(script, stores).await?);
        }

        self.logger.success(
            "Finished running all server initialization scripts, starting server",
        );

        Ok(InitReport {
            started_at,
            finished_at: Utc::now(),
            scripts: reports,
        })
    }
}
