//! The object callers start from

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_config::{OptionsMap, SupervisorOptions};
use tandem_ipc::ResourceIdentity;
use tandem_logging::StructuredLogger;

use crate::delegate::ProcessDelegate;
use crate::error::{ProxyError, SupervisorError};
use crate::process::Logger;
use crate::proxy::{CommunicatesWithSupervisor, IdentifiesResource, Proxy, ResourceProxy};
use crate::supervisor::ProcessSupervisor;

/// A running worker and a proxy on its default target.
///
/// The worker stops when the entry point and every proxy obtained from it are
/// dropped, unless [`keep_alive`](Self::keep_alive) was called.
pub struct EntryPoint {
    supervisor: Arc<ProcessSupervisor>,
    root: ResourceProxy,
}

impl EntryPoint {
    pub fn builder(delegate_path: impl AsRef<Path>) -> EntryPointBuilder {
        EntryPointBuilder::new(delegate_path.as_ref().to_path_buf())
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Proxy on the delegate's default target
    pub fn root(&self) -> &ResourceProxy {
        &self.root
    }

    /// Root proxy whose instructions catch worker errors
    pub fn try_catch(&self) -> ResourceProxy {
        self.root.try_catch()
    }

    /// Stop the worker, proxies obtained from this entry point stop working
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    /// Leave the worker running after the last handle is dropped, returns its pid
    pub fn keep_alive(&self) -> u32 {
        self.supervisor.keep_alive()
    }
}

impl IdentifiesResource for EntryPoint {
    fn resource_identity(&self) -> Option<&ResourceIdentity> {
        self.root.resource_identity()
    }

    fn set_resource_identity(&self, identity: ResourceIdentity) -> Result<(), ProxyError> {
        self.root.set_resource_identity(identity)
    }
}

impl CommunicatesWithSupervisor for EntryPoint {
    fn supervisor(&self) -> Result<&Arc<ProcessSupervisor>, ProxyError> {
        Ok(&self.supervisor)
    }

    fn set_supervisor(&self, _supervisor: Arc<ProcessSupervisor>) -> Result<(), ProxyError> {
        Err(ProxyError::SupervisorAlreadySet)
    }
}

#[async_trait]
impl Proxy for EntryPoint {}

/// Collects what is needed to start a worker
pub struct EntryPointBuilder {
    delegate_path: PathBuf,
    process_delegate: Option<Arc<dyn ProcessDelegate>>,
    base_options: Option<SupervisorOptions>,
    default_options: OptionsMap,
    user_options: OptionsMap,
    forbidden_options: Vec<String>,
    logger: Logger,
}

impl EntryPointBuilder {
    fn new(delegate_path: PathBuf) -> Self {
        Self {
            delegate_path,
            process_delegate: None,
            base_options: None,
            default_options: OptionsMap::new(),
            user_options: OptionsMap::new(),
            forbidden_options: Vec::new(),
            logger: None,
        }
    }

    /// Maps worker classes to host resource kinds
    pub fn process_delegate(mut self, delegate: impl ProcessDelegate + 'static) -> Self {
        self.process_delegate = Some(Arc::new(delegate));
        self
    }

    /// Start from options loaded elsewhere, e.g. by `ConfigLoader`
    pub fn base_options(mut self, options: SupervisorOptions) -> Self {
        self.base_options = Some(options);
        self
    }

    /// Defaults chosen by the integrating library
    pub fn default_options(mut self, options: OptionsMap) -> Self {
        self.default_options.extend(options);
        self
    }

    /// Options chosen by the end user, they override the defaults
    pub fn options(mut self, options: OptionsMap) -> Self {
        self.user_options.extend(options);
        self
    }

    /// A single user option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.user_options.insert(key.into(), value.into());
        self
    }

    /// User options that are silently dropped
    pub fn forbidden_options<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_options.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn logger(mut self, logger: Arc<dyn StructuredLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The options the worker would be started with
    pub fn resolve_options(&self) -> Result<SupervisorOptions, SupervisorError> {
        let mut defaults = match &self.base_options {
            Some(options) => options.to_map()?,
            None => OptionsMap::new(),
        };
        defaults.extend(self.default_options.clone());

        Ok(SupervisorOptions::from_maps(
            &defaults,
            &self.user_options,
            &self.forbidden_options,
        )?)
    }

    /// Spawn the worker
    pub async fn build(self) -> Result<EntryPoint, SupervisorError> {
        let options = self.resolve_options()?;
        let supervisor = ProcessSupervisor::start(
            &self.delegate_path,
            options,
            self.process_delegate,
            self.logger,
        )
        .await?;
        let root = supervisor.root_proxy()?;

        Ok(EntryPoint { supervisor, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_user_options_override_defaults_except_forbidden() {
        let builder = EntryPoint::builder("delegate.js")
            .default_options(
                json!({"read_timeout": 5, "stop_timeout": 1})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .option("read_timeout", 0.5)
            .option("stop_timeout", 10)
            .option("foo", "bar")
            .forbidden_options(["stop_timeout"]);

        let options = builder.resolve_options().unwrap();
        assert_eq!(options.read_timeout, Some(Duration::from_millis(500)));
        assert_eq!(options.stop_timeout, Duration::from_secs(1));
        assert_eq!(options.extra_option("foo"), Some(&json!("bar")));
    }

    #[test]
    fn test_base_options_are_the_lowest_layer() {
        let base = SupervisorOptions {
            debug: true,
            idle_timeout: None,
            ..SupervisorOptions::default()
        };
        let options = EntryPoint::builder("delegate.js")
            .base_options(base)
            .option("idle_timeout", 2)
            .resolve_options()
            .unwrap();

        assert!(options.debug);
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let result = EntryPoint::builder("delegate.js")
            .option("idle_timeout", -1)
            .resolve_options();
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }
}
