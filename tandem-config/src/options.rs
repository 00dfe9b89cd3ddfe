//! Options of a supervised worker

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, validate_timeout, Validatable};

/// Loosely-typed options as provided by callers
pub type OptionsMap = serde_json::Map<String, JsonValue>;

/// Name of the worker binary shipped with Tandem
pub const WORKER_BINARY: &str = "tandem-worker";

/// Options recognised by the supervisor.
///
/// Keys it does not know about are kept in `extra` and forwarded to the
/// worker, where the delegate script can read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorOptions {
    /// Worker binary to launch, `None` for [`default_worker_executable`]
    pub executable_path: Option<PathBuf>,

    /// Inactivity window after which the worker exits
    #[serde(with = "crate::utils::serde_seconds_option")]
    pub idle_timeout: Option<Duration>,

    /// Bound on the wait for one reply
    #[serde(with = "crate::utils::serde_seconds_option")]
    pub read_timeout: Option<Duration>,

    /// Grace period between SIGTERM and a forced kill
    #[serde(with = "crate::utils::serde_seconds")]
    pub stop_timeout: Duration,

    /// Append remote stack traces to error messages
    pub debug: bool,

    /// Ship the worker's console output with each reply
    pub log_node_console: bool,

    #[serde(flatten)]
    pub extra: OptionsMap,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            executable_path: None,
            idle_timeout: Some(Duration::from_secs(60)),
            read_timeout: Some(Duration::from_secs(30)),
            stop_timeout: Duration::from_secs(3),
            debug: false,
            log_node_console: false,
            extra: OptionsMap::new(),
        }
    }
}

impl SupervisorOptions {
    /// Merge `user` over `defaults`, dropping the `forbidden` user keys, then
    /// parse and validate the result
    pub fn from_maps(defaults: &OptionsMap, user: &OptionsMap, forbidden: &[String]) -> ConfigResult<Self> {
        let merged = merge_options(defaults, user, forbidden);
        let options: Self = serde_json::from_value(JsonValue::Object(merged))?;
        options.validate()?;
        Ok(options)
    }

    /// The options as a plain map, the form handed to the worker
    pub fn to_map(&self) -> ConfigResult<OptionsMap> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            _ => Err(self.validation_error("options did not serialize to an object")),
        }
    }

    /// The worker binary to launch
    pub fn executable(&self) -> PathBuf {
        self.executable_path
            .clone()
            .unwrap_or_else(default_worker_executable)
    }

    /// A key forwarded to the worker as-is
    pub fn extra_option(&self, key: &str) -> Option<&JsonValue> {
        self.extra.get(key)
    }
}

impl Validatable for SupervisorOptions {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(path) = &self.executable_path {
            validate_required_string(&path.to_string_lossy(), "executable_path", self.domain_name())?;
        }

        validate_timeout(self.idle_timeout, "idle_timeout", self.domain_name())?;
        validate_timeout(self.read_timeout, "read_timeout", self.domain_name())?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}

/// Overlay `user` on `defaults`. User keys listed in `forbidden` are dropped
/// without error.
pub fn merge_options(defaults: &OptionsMap, user: &OptionsMap, forbidden: &[String]) -> OptionsMap {
    let mut merged = defaults.clone();

    for (key, value) in user {
        if forbidden.iter().any(|name| name == key) {
            debug!("Dropping forbidden option \"{}\"", key);
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }

    merged
}

/// `tandem-worker` next to the running executable (or one directory up, where
/// Cargo puts binaries relative to test executables), else whatever `PATH`
/// resolves.
pub fn default_worker_executable() -> PathBuf {
    let binary = format!("{}{}", WORKER_BINARY, std::env::consts::EXE_SUFFIX);

    if let Ok(current) = std::env::current_exe() {
        let candidates = current
            .ancestors()
            .skip(1)
            .take(2)
            .map(|dir| dir.join(&binary));

        for candidate in candidates {
            if candidate.is_file() {
                return candidate;
            }
        }
    }

    PathBuf::from(binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: JsonValue) -> OptionsMap {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_defaults() {
        let options = SupervisorOptions::default();
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.stop_timeout, Duration::from_secs(3));
        assert!(!options.debug);
        assert!(!options.log_node_console);
    }

    #[test]
    fn test_user_options_override_defaults() {
        let defaults = map(json!({"idle_timeout": 10, "debug": true, "eager_by_default": true}));
        let user = map(json!({"idle_timeout": 0.5, "foo": "bar"}));

        let options = SupervisorOptions::from_maps(&defaults, &user, &[]).unwrap();
        assert_eq!(options.idle_timeout, Some(Duration::from_millis(500)));
        assert!(options.debug);
        assert_eq!(options.extra_option("foo"), Some(&json!("bar")));
        assert_eq!(options.extra_option("eager_by_default"), Some(&json!(true)));
    }

    #[test]
    fn test_forbidden_user_options_are_dropped() {
        let defaults = map(json!({"stop_timeout": 1}));
        let user = map(json!({"stop_timeout": 9, "foo": "bar", "debug": true}));
        let forbidden = vec!["stop_timeout".to_string(), "foo".to_string()];

        let options = SupervisorOptions::from_maps(&defaults, &user, &forbidden).unwrap();
        assert_eq!(options.stop_timeout, Duration::from_secs(1));
        assert!(options.extra_option("foo").is_none());
        assert!(options.debug);
    }

    #[test]
    fn test_null_disables_timeouts() {
        let user = map(json!({"idle_timeout": null, "read_timeout": null}));
        let options = SupervisorOptions::from_maps(&OptionsMap::new(), &user, &[]).unwrap();

        assert_eq!(options.idle_timeout, None);
        assert_eq!(options.read_timeout, None);
    }

    #[test]
    fn test_invalid_option_types_are_rejected() {
        let user = map(json!({"stop_timeout": "three"}));
        assert!(SupervisorOptions::from_maps(&OptionsMap::new(), &user, &[]).is_err());

        let user = map(json!({"executable_path": ""}));
        assert!(SupervisorOptions::from_maps(&OptionsMap::new(), &user, &[]).is_err());
    }

    #[test]
    fn test_to_map_keeps_extra_keys_at_top_level() {
        let user = map(json!({"eager_by_default": false}));
        let options = SupervisorOptions::from_maps(&OptionsMap::new(), &user, &[]).unwrap();
        let wire = options.to_map().unwrap();

        assert_eq!(wire["eager_by_default"], json!(false));
        assert_eq!(wire["idle_timeout"], json!(60.0));
        assert!(wire["executable_path"].is_null());
    }
}
