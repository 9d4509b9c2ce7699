//! Subscription predicates over inbound file events.
//!
//! A task does not see every [`FileEvent`] the watcher produces, only the
//! ones its [`EventFilter`] accepts. All criteria use AND logic; unset
//! criteria always match.
//!
//! # Example
//!
//! ```rust
//! use wipwatch_monitor::subscription::EventFilter;
//! use wipwatch_monitor::types::{ChangeKind, FileEvent};
//!
//! let filter = EventFilter::new()
//!     .with_project("shop")
//!     .with_plugin("filecontent")
//!     .with_key_suffix(".py")
//!     .with_kinds([ChangeKind::Created, ChangeKind::Modified]);
//!
//! let event = FileEvent::new("shop", "filecontent", "src/cart.py", ChangeKind::Modified, None);
//! assert!(filter.matches(&event));
//! ```

use std::collections::HashSet;

use crate::config::Config;
use crate::types::{ChangeKind, FileEvent, FILECONTENT_PLUGIN};

/// Filter criteria for selecting which file events a task receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Filter by project name.
    pub project: Option<String>,

    /// Filter by producing plugin.
    pub plugin: Option<String>,

    /// Key must end with this suffix.
    pub key_suffix: Option<String>,

    /// Key must start with this prefix.
    pub key_prefix: Option<String>,

    /// Accepted change kinds. Empty accepts every kind.
    pub kinds: HashSet<ChangeKind>,
}

impl EventFilter {
    /// Creates a new empty filter that matches all events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project filter (builder pattern).
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the plugin filter (builder pattern).
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Sets the key suffix filter (builder pattern).
    #[must_use]
    pub fn with_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.key_suffix = Some(suffix.into());
        self
    }

    /// Sets the key prefix filter (builder pattern).
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Restricts the accepted change kinds (builder pattern).
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Checks if an event matches every criterion set on this filter.
    #[must_use]
    pub fn matches(&self, event: &FileEvent) -> bool {
        if let Some(ref project) = self.project {
            if &event.project != project {
                return false;
            }
        }

        if let Some(ref plugin) = self.plugin {
            if &event.plugin != plugin {
                return false;
            }
        }

        if let Some(ref suffix) = self.key_suffix {
            if !event.key.ends_with(suffix.as_str()) {
                return false;
            }
        }

        if let Some(ref prefix) = self.key_prefix {
            if !event.key.starts_with(prefix.as_str()) {
                return false;
            }
        }

        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }

    /// Returns `true` if this filter has no criteria set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.plugin.is_none()
            && self.key_suffix.is_none()
            && self.key_prefix.is_none()
            && self.kinds.is_empty()
    }
}

/// Created or modified Python files anywhere in the project.
///
/// Drives the WIP test runs.
#[must_use]
pub fn modified_pyfiles(config: &Config) -> EventFilter {
    EventFilter::new()
        .with_project(config.project_name.clone())
        .with_plugin(FILECONTENT_PLUGIN)
        .with_key_suffix(".py")
        .with_kinds([ChangeKind::Created, ChangeKind::Modified])
}

/// Created or modified Python files under the tests path.
///
/// Drives test re-collection.
#[must_use]
pub fn modified_testfiles(config: &Config) -> EventFilter {
    modified_pyfiles(config).with_key_prefix(config.tests_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(project: &str, plugin: &str, key: &str, kind: ChangeKind) -> FileEvent {
        FileEvent::new(project, plugin, key, kind, Some(String::new()))
    }

    fn test_config() -> Config {
        Config::new("/srv/shop", "shop")
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = EventFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&make_event("a", "b", "c", ChangeKind::Deleted)));
    }

    #[test]
    fn each_criterion_rejects_independently() {
        let event = make_event("shop", "filecontent", "tests/test_cart.py", ChangeKind::Modified);

        assert!(!EventFilter::new().with_project("other").matches(&event));
        assert!(!EventFilter::new().with_plugin("git").matches(&event));
        assert!(!EventFilter::new().with_key_suffix(".rs").matches(&event));
        assert!(!EventFilter::new().with_key_prefix("src").matches(&event));
        assert!(!EventFilter::new()
            .with_kinds([ChangeKind::Created])
            .matches(&event));
    }

    #[test]
    fn pyfiles_accepts_created_and_modified_python() {
        let filter = modified_pyfiles(&test_config());

        assert!(filter.matches(&make_event("shop", "filecontent", "src/cart.py", ChangeKind::Created)));
        assert!(filter.matches(&make_event("shop", "filecontent", "tests/test_cart.py", ChangeKind::Modified)));
    }

    #[test]
    fn pyfiles_rejects_other_events() {
        let filter = modified_pyfiles(&test_config());

        assert!(!filter.matches(&make_event("shop", "filecontent", "src/cart.py", ChangeKind::Deleted)));
        assert!(!filter.matches(&make_event("shop", "filecontent", "README.md", ChangeKind::Modified)));
        assert!(!filter.matches(&make_event("blog", "filecontent", "src/cart.py", ChangeKind::Modified)));
        assert!(!filter.matches(&make_event("shop", "pytest", "src/cart.py", ChangeKind::Modified)));
    }

    #[test]
    fn testfiles_requires_tests_path_prefix() {
        let filter = modified_testfiles(&test_config());

        assert!(filter.matches(&make_event("shop", "filecontent", "tests/test_cart.py", ChangeKind::Modified)));
        assert!(!filter.matches(&make_event("shop", "filecontent", "src/cart.py", ChangeKind::Modified)));
    }

    #[test]
    fn testfiles_uses_configured_tests_path() {
        let mut config = test_config();
        config.tests_path = "src/checks".to_string();
        let filter = modified_testfiles(&config);

        assert!(filter.matches(&make_event("shop", "filecontent", "src/checks/test_a.py", ChangeKind::Created)));
        assert!(!filter.matches(&make_event("shop", "filecontent", "tests/test_a.py", ChangeKind::Created)));
    }
}
