//! Synchronization configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::dialect::ConnectParams;

/// What to do when in-flight requests do not drain in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutAction {
    /// Rebuild anyway and record a warning.
    #[default]
    Proceed,
    /// Give up without rebuilding.
    Abort,
}

/// How long to wait for in-flight requests before swapping the live model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuiescencePolicy {
    /// Number of requests that may still be active, e.g. the request
    /// performing the import.
    pub idle_threshold: usize,
    /// Longest time to wait for requests to drain.
    pub max_wait: Duration,
    /// Applied when `max_wait` elapses first.
    pub on_timeout: TimeoutAction,
}

impl Default for QuiescencePolicy {
    fn default() -> Self {
        Self {
            idle_threshold: 0,
            max_wait: Duration::from_secs(300),
            on_timeout: TimeoutAction::Proceed,
        }
    }
}

impl QuiescencePolicy {
    /// Create a policy that gives up after `max_wait`.
    pub fn abort_after(max_wait: Duration) -> Self {
        Self {
            max_wait,
            on_timeout: TimeoutAction::Abort,
            ..Default::default()
        }
    }

    pub fn with_idle_threshold(mut self, threshold: usize) -> Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_timeout_action(mut self, action: TimeoutAction) -> Self {
        self.on_timeout = action;
        self
    }
}

/// Configuration threaded through a synchronization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Connection parameters overriding the task registration.
    pub connection: Option<ConnectParams>,
    pub quiescence: QuiescencePolicy,
    /// Grant every role full rights on newly imported items.
    pub default_privileges: bool,
    /// Directory bundle assets are exported from and imported into.
    pub asset_root: Option<PathBuf>,
    /// Asset paths relative to the asset root, files or directories.
    pub asset_paths: Vec<PathBuf>,
    /// File extensions never packed into a bundle.
    pub excluded_extensions: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connection: None,
            quiescence: QuiescencePolicy::default(),
            default_privileges: true,
            asset_root: None,
            asset_paths: Vec::new(),
            excluded_extensions: vec!["pyc".to_string()],
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect with these parameters instead of the registered ones.
    pub fn with_connection(mut self, params: ConnectParams) -> Self {
        self.connection = Some(params);
        self
    }

    pub fn with_quiescence(mut self, policy: QuiescencePolicy) -> Self {
        self.quiescence = policy;
        self
    }

    pub fn with_default_privileges(mut self, enabled: bool) -> Self {
        self.default_privileges = enabled;
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    pub fn with_asset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset_paths.push(path.into());
        self
    }

    pub fn with_excluded_extension(mut self, ext: impl Into<String>) -> Self {
        self.excluded_extensions.push(ext.into());
        self
    }

    /// Check if a file extension is excluded from bundles.
    pub fn is_excluded(&self, ext: &str) -> bool {
        self.excluded_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert!(config.default_privileges);
        assert_eq!(config.quiescence.max_wait, Duration::from_secs(300));
        assert_eq!(config.quiescence.on_timeout, TimeoutAction::Proceed);
        assert!(config.is_excluded("PYC"));
        assert!(!config.is_excluded("js"));
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::new()
            .with_connection(ConnectParams::file("app.sqlite"))
            .with_quiescence(
                QuiescencePolicy::default()
                    .with_idle_threshold(1)
                    .with_max_wait(Duration::from_millis(50))
                    .with_timeout_action(TimeoutAction::Abort),
            )
            .with_asset_root("/srv/app")
            .with_asset_path("js")
            .with_default_privileges(false);

        assert_eq!(config.connection.unwrap().database, "app.sqlite");
        assert_eq!(config.quiescence.idle_threshold, 1);
        assert_eq!(config.asset_paths, [PathBuf::from("js")]);
        assert!(!config.default_privileges);
    }
}
