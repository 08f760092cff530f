//! End-to-end orchestration tests.
//!
//! Resolution and loading are replaced with in-memory fakes so each test can
//! describe a set of scripts and what they return.

#![cfg(test)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use super::*;
use crate::config::ScriptSelection;
use crate::loader::{JsonModuleLoader, ModuleExports};
use crate::logging::capture::CapturedLogs;

/// Resolves identifiers from a fixed table.
#[derive(Default)]
struct TableResolver {
    files: HashMap<String, PathBuf>,
}

impl PathResolver for TableResolver {
    fn resolve<'a>(
        &'a self,
        identifier: &'a ScriptName,
        _extensions: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + 'a>> {
        let found = self.files.get(identifier.as_str()).cloned();
        Box::pin(async move { Ok(found) })
    }
}

/// Serves module namespaces from memory and records every load.
#[derive(Default)]
struct TableLoader {
    modules: HashMap<PathBuf, ModuleExports>,
    loaded: Arc<Mutex<Vec<PathBuf>>>,
}

impl ModuleLoader for TableLoader {
    fn load<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<ModuleExports>> + Send + 'a>> {
        Box::pin(async move {
            // Yield once so ordering bugs would show up as interleaving.
            tokio::task::yield_now().await;
            self.loaded.lock().unwrap().push(path.to_path_buf());
            self.modules
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow!("SyntaxError: Unexpected token in {}", path.display()))
        })
    }
}

/// Builds a resolver/loader pair from `(name, result export)` pairs.
///
/// A `None` export produces a module with no `result` at all.
struct Fixture {
    resolver: TableResolver,
    loader: TableLoader,
}

impl Fixture {
    fn new() -> Self {
        Self {
            resolver: TableResolver::default(),
            loader: TableLoader::default(),
        }
    }

    fn script(mut self, name: &str, result: Option<Value>) -> Self {
        let path = PathBuf::from(format!("/app/{}.ts", name));
        let mut exports = ModuleExports::new();
        if let Some(result) = result {
            exports.insert("result".to_string(), result);
        }
        self.resolver.files.insert(name.to_string(), path.clone());
        self.loader.modules.insert(path, exports);
        self
    }

    /// A script that resolves but fails to load.
    fn broken(mut self, name: &str) -> Self {
        let path = PathBuf::from(format!("/app/{}.ts", name));
        self.resolver.files.insert(name.to_string(), path);
        self
    }

    fn build(self, options: ServerInitOptions) -> (InitOrchestrator, Arc<Mutex<Vec<PathBuf>>>) {
        let loaded = self.loader.loaded.clone();
        let orchestrator =
            InitOrchestrator::new(options, Arc::new(self.resolver), Arc::new(self.loader));
        (orchestrator, loaded)
    }
}

fn loaded_names(loaded: &Arc<Mutex<Vec<PathBuf>>>) -> Vec<String> {
    loaded
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_resolution_preserves_declaration_order() {
    let (orchestrator, _) = Fixture::new()
        .script("c", Some(json!({ "pass": true })))
        .script("a", Some(json!({ "pass": true })))
        .script("b", Some(json!({ "pass": true })))
        .build(ServerInitOptions::default().with_scripts(["c", "a", "b", "a"]));

    let resolved = orchestrator.resolve_scripts().await.unwrap();
    let names: Vec<&str> = resolved.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["c", "a", "b", "a"]);
}

#[tokio::test]
async fn test_missing_default_script_is_noop() {
    let (orchestrator, loaded) = Fixture::new().build(ServerInitOptions::default());
    assert_eq!(orchestrator.options().scripts, ScriptSelection::Default);

    let mut stores = ConfigStores::default();
    let report = orchestrator.run(&mut stores).await.unwrap();

    assert!(report.scripts.is_empty());
    assert_eq!(stores, ConfigStores::default());
    assert!(loaded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_default_script_runs_when_present() {
    let (orchestrator, _) = Fixture::new()
        .script("server.init", Some(json!({ "pass": true, "runtimeConfig": { "foo": "bar" } })))
        .build(ServerInitOptions::default());

    let mut stores = ConfigStores::default();
    let report = orchestrator.run(&mut stores).await.unwrap();

    assert_eq!(report.passed(), 1);
    assert_eq!(stores.runtime_config["foo"], "bar");
}

#[tokio::test]
async fn test_explicit_missing_script_aborts_before_execution() {
    let (orchestrator, loaded) = Fixture::new()
        .script("a", Some(json!({ "pass": true, "appConfig": { "a": 1 } })))
        .script("b", Some(json!({ "pass": true, "appConfig": { "b": 1 } })))
        .build(ServerInitOptions::default().with_scripts(["a", "missing", "b"]));

    let mut stores = ConfigStores::default();
    let err = orchestrator.run(&mut stores).await.unwrap_err();

    assert_eq!(err, ServerInitError::ScriptNotFound(ScriptName::new("missing")));
    assert!(loaded.lock().unwrap().is_empty());
    assert_eq!(stores, ConfigStores::default());
}

#[tokio::test]
async fn test_explicit_default_name_is_mandatory() {
    let (orchestrator, _) = Fixture::new()
        .build(ServerInitOptions::default().with_scripts(["server.init"]));

    let mut stores = ConfigStores::default();
    let err = orchestrator.run(&mut stores).await.unwrap_err();

    assert!(matches!(err, ServerInitError::ScriptNotFound(name) if name.as_str() == "server.init"));
}

#[tokio::test]
async fn test_later_scripts_overwrite_earlier_keys() {
    let (orchestrator, loaded) = Fixture::new()
        .script("a", Some(json!({ "pass": true, "runtimeConfig": { "foo": "a" } })))
        .script("b", Some(json!({ "pass": true, "runtimeConfig": { "foo": "b", "baz": "c" } })))
        .build(ServerInitOptions::default().with_scripts(["a", "b"]));

    let mut stores = ConfigStores::default();
    orchestrator.run(&mut stores).await.unwrap();

    assert_eq!(
        Value::Object(stores.runtime_config),
        json!({ "foo": "b", "baz": "c" })
    );
    assert_eq!(loaded_names(&loaded), vec!["a", "b"]);
}

#[tokio::test]
async fn test_continue_on_fail_moves_to_next_script() {
    let (orchestrator, _) = Fixture::new()
        .script("flaky", Some(json!({ "pass": false, "continueOnFail": true })))
        .script("app", Some(json!({ "pass": true, "appConfig": { "x": 1 } })))
        .build(ServerInitOptions::default().with_scripts(["flaky", "app"]));

    let mut stores = ConfigStores::default();
    let report = orchestrator.run(&mut stores).await.unwrap();

    assert_eq!(stores.app_config["x"], 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.passed(), 1);
    assert_eq!(report.scripts[0].state, ScriptState::FailedContinue);
    assert_eq!(report.scripts[1].state, ScriptState::PassedMerged);
    assert_eq!(report.scripts[1].merged, vec![MergeTarget::AppConfig]);
}

#[tokio::test]
async fn test_failed_script_fragments_are_not_merged() {
    let (orchestrator, _) = Fixture::new()
        .script(
            "flaky",
            Some(json!({
                "pass": false,
                "continueOnFail": true,
                "runtimeConfig": { "leaked": true },
                "appConfig": { "leaked": true }
            })),
        )
        .build(ServerInitOptions::default().with_scripts(["flaky"]));

    let mut stores = ConfigStores::default();
    orchestrator.run(&mut stores).await.unwrap();

    assert!(stores.runtime_config.is_empty());
    assert!(stores.app_config.is_empty());
}

#[tokio::test]
async fn test_halting_failure_stops_later_scripts() {
    let (orchestrator, loaded) = Fixture::new()
        .script("first", Some(json!({ "pass": true, "appConfig": { "first": true } })))
        .script("gate", Some(json!({ "pass": false, "continueOnFail": false })))
        .script("after", Some(json!({ "pass": true, "appConfig": { "after": true } })))
        .build(ServerInitOptions::default().with_scripts(["first", "gate", "after"]));

    let mut stores = ConfigStores::default();
    let err = orchestrator.run(&mut stores).await.unwrap_err();

    assert_eq!(err, ServerInitError::ScriptFailed(ScriptName::new("gate")));
    assert_eq!(loaded_names(&loaded), vec!["first", "gate"]);
    // No rollback of earlier merges.
    assert_eq!(stores.app_config["first"], true);
    assert!(stores.app_config.get("after").is_none());
}

#[tokio::test]
async fn test_absent_continue_on_fail_halts() {
    let (orchestrator, loaded) = Fixture::new()
        .script("gate", Some(json!({ "pass": false })))
        .script("after", Some(json!({ "pass": true })))
        .build(ServerInitOptions::default().with_scripts(["gate", "after"]));

    let mut stores = ConfigStores::default();
    let err = orchestrator.run(&mut stores).await.unwrap_err();

    assert!(matches!(err, ServerInitError::ScriptFailed(_)));
    assert_eq!(loaded_names(&loaded), vec!["gate"]);
}

#[tokio::test]
async fn test_public_config_lands_in_runtime_public() {
    let (orchestrator, _) = Fixture::new()
        .script(
            "example.init",
            Some(json!({
                "pass": true,
                "runtimeConfig": { "foo": "bar" },
                "publicConfig": { "gee": "wiz" },
                "appConfig": { "hello": "world", "pizza": "Best Food!" },
                "continueOnFail": true
            })),
        )
        .build(ServerInitOptions::default().with_scripts(["example.init"]));

    let mut stores = ConfigStores::default();
    let report = orchestrator.run(&mut stores).await.unwrap();

    assert_eq!(
        Value::Object(stores.runtime_config),
        json!({ "foo": "bar", "public": { "gee": "wiz" } })
    );
    assert_eq!(stores.app_config["pizza"], "Best Food!");
    assert_eq!(
        report.scripts[0].merged,
        vec![
            MergeTarget::RuntimeConfig,
            MergeTarget::PublicConfig,
            MergeTarget::AppConfig
        ]
    );
}

#[tokio::test]
async fn test_missing_result_export_is_malformed() {
    let (orchestrator, _) = Fixture::new()
        .script("empty", None)
        .build(ServerInitOptions::default().with_scripts(["empty"]));

    let mut stores = ConfigStores::default();
    let err = orchestrator.run(&mut stores).await.unwrap_err();

    match err {
        ServerInitError::MalformedResult { script, reason } => {
            assert_eq!(script.as_str(), "empty");
            assert!(reason.contains("missing `result` export"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_load_failure_is_fatal() {
    let (orchestrator, _) = Fixture::new()
        .broken("syntax")
        .script("after", Some(json!({ "pass": true, "appConfig": { "after": true } })))
        .build(ServerInitOptions::default().with_scripts(["syntax", "after"]));

    let mut stores = ConfigStores::default();
    let err = orchestrator.run(&mut stores).await.unwrap_err();

    assert!(matches!(err, ServerInitError::LoadFailed { ref script, .. } if script.as_str() == "syntax"));
    assert!(stores.app_config.is_empty());
}

#[tokio::test]
async fn test_empty_explicit_list_completes() {
    let (orchestrator, _) =
        Fixture::new().build(ServerInitOptions::default().with_scripts(Vec::<String>::new()));

    let mut stores = ConfigStores::default();
    let report = orchestrator.run(&mut stores).await.unwrap();
    assert!(report.scripts.is_empty());
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn test_silent_suppresses_info_but_keeps_warnings() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (orchestrator, _) = Fixture::new()
        .script("flaky", Some(json!({ "pass": false, "continueOnFail": true })))
        .script("gate", Some(json!({ "pass": false })))
        .build(
            ServerInitOptions::default()
                .with_scripts(["flaky", "gate"])
                .with_silent(true),
        );

    let mut stores = ConfigStores::default();
    assert!(orchestrator.run(&mut stores).await.is_err());

    let out = logs.contents();
    assert!(!out.contains("Checking if there are any server initialization scripts"));
    assert!(!out.contains("Running script"));
    assert!(out.contains("flaky server initialization script failed but continueOnFail"));
    assert!(out.contains("gate server initialization script failed and continueOnFail"));
}

#[tokio::test]
async fn test_verbose_run_reports_progress() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let (orchestrator, _) = Fixture::new()
        .script("a", Some(json!({ "pass": true, "appConfig": { "a": 1 } })))
        .build(ServerInitOptions::default().with_scripts(["a"]));

    let mut stores = ConfigStores::default();
    orchestrator.run(&mut stores).await.unwrap();

    let out = logs.contents();
    assert!(out.contains("Found script file at: /app/a.ts"));
    assert!(out.contains("Running script: a"));
    assert!(out.contains("Merging new config from a into appConfig"));
    assert!(out.contains("a script ran successfully"));
    assert!(out.contains("Finished running all server initialization scripts"));
}

#[tokio::test]
async fn test_filesystem_run_with_json_modules() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("db.check.json"),
        r#"{ "result": { "pass": true, "runtimeConfig": { "dbUrl": "postgres://db" } } }"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("flags.json"),
        r#"{ "result": { "pass": true, "publicConfig": { "beta": true } } }"#,
    )
    .unwrap();

    let mut options = ServerInitOptions::default()
        .with_root_dir(dir.path())
        .with_scripts(["db.check", "flags"]);
    options.extensions = vec![".json".to_string()];

    let orchestrator = InitOrchestrator::new(
        options,
        Arc::new(FsPathResolver::new(dir.path())),
        Arc::new(JsonModuleLoader),
    );

    let mut stores = ConfigStores::default();
    let report = orchestrator.run(&mut stores).await.unwrap();

    assert_eq!(report.passed(), 2);
    assert_eq!(stores.runtime_config["dbUrl"], "postgres://db");
    assert_eq!(stores.public_config().unwrap()["beta"], true);
}

#[tokio::test]
async fn test_from_options_rejects_empty_runtime() {
    let mut options = ServerInitOptions::default();
    options.node_command.clear();

    let err = InitOrchestrator::from_options(options).err().unwrap();
    assert!(matches!(err, ServerInitError::Config(_)));
}
