//! # Script Loading
//!
//! `load(uri, opts)` accepts three schemes:
//!
//! - `system://<path>` runs a built-in module registered under `<path>`,
//! - `file://<path>` reads a script from disk,
//! - `http://` and `https://` fetch a script over the network.
//!
//! Text scripts are handed to the configured [`ScriptEvaluator`]; parsing the scripting
//! language itself is not this crate's business. Any other scheme is `UnsupportedScheme`.

use crate::experiment::runtime::Experiment;
use crate::framework::{ControlError, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A script compiled into the binary.
pub type BuiltinModule = fn(&mut Experiment) -> Result<()>;

/// Runs script text against an experiment.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(&self, experiment: &mut Experiment, origin: &str, source: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptUri {
    System(String),
    File(PathBuf),
    Http(String),
}

impl ScriptUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ControlError::UnsupportedScheme(uri.to_owned()))?;
        match scheme {
            "system" => Ok(Self::System(rest.to_owned())),
            "file" => Ok(Self::File(PathBuf::from(rest))),
            "http" | "https" => Ok(Self::Http(uri.to_owned())),
            other => Err(ControlError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl fmt::Display for ScriptUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(path) => write!(f, "system://{path}"),
            Self::File(path) => write!(f, "file://{}", path.display()),
            Self::Http(url) => f.write_str(url),
        }
    }
}

/// What a URI resolved to.
pub enum ScriptSource {
    Builtin(BuiltinModule),
    Text(String),
}

pub struct ScriptLoader {
    modules: HashMap<String, BuiltinModule>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    http: reqwest::Client,
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptLoader {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            modules: HashMap::new(),
            evaluator: None,
            http,
        }
    }

    /// Makes `module` loadable as `system://<path>`.
    pub fn register_module(&mut self, path: &str, module: BuiltinModule) -> &mut Self {
        self.modules.insert(path.to_owned(), module);
        self
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<dyn ScriptEvaluator>) -> &mut Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn evaluator(&self) -> Option<Arc<dyn ScriptEvaluator>> {
        self.evaluator.clone()
    }

    /// Resolves a URI to something runnable. Errors are the reason for a load failure.
    pub async fn fetch(&self, uri: &ScriptUri) -> std::result::Result<ScriptSource, String> {
        debug!(%uri, "Fetching script");
        match uri {
            ScriptUri::System(path) => self
                .modules
                .get(path)
                .copied()
                .map(ScriptSource::Builtin)
                .ok_or_else(|| format!("no built-in module at '{path}'")),
            ScriptUri::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(ScriptSource::Text)
                .map_err(|e| e.to_string()),
            ScriptUri::Http(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| e.to_string())?;
                response
                    .text()
                    .await
                    .map(ScriptSource::Text)
                    .map_err(|e| e.to_string())
            }
        }
    }
}
