//! Options as seen by the worker

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tandem_config::OptionsMap;
use tandem_ipc::ExecutionMode;

use crate::error::WorkerError;

/// The subset of the supervisor options the worker acts on.
///
/// The full map is kept in `raw` and exposed to the delegate script.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    #[serde(with = "tandem_config::utils::serde_seconds_option")]
    pub idle_timeout: Option<Duration>,
    pub debug: bool,
    pub log_node_console: bool,
    pub default_execution_mode: ExecutionMode,
    #[serde(skip)]
    pub raw: OptionsMap,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(60)),
            debug: false,
            log_node_console: false,
            default_execution_mode: ExecutionMode::Eager,
            raw: OptionsMap::new(),
        }
    }
}

impl WorkerOptions {
    /// Parse the options argument of the worker command line
    pub fn from_json(text: Option<&str>) -> Result<Self, WorkerError> {
        let raw: OptionsMap = match text.map(str::trim) {
            Some(text) if !text.is_empty() => serde_json::from_str(text)
                .map_err(|e| WorkerError::Config(format!("options must be a JSON object: {}", e)))?,
            _ => OptionsMap::new(),
        };

        let mut options: Self = serde_json::from_value(JsonValue::Object(raw.clone()))
            .map_err(|e| WorkerError::Config(e.to_string()))?;
        options.raw = raw;
        Ok(options)
    }
}
