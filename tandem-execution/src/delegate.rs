//! Mapping of worker classes to host resource kinds

use crate::proxy::{StatsResource, TypedResource, BASIC_RESOURCE};

/// Picks the host type of the resources a worker returns
pub trait ProcessDelegate: Send + Sync {
    /// Resource kind for objects of the worker class `class_name`, `None` for
    /// a [`BasicResource`](crate::proxy::BasicResource)
    fn resource_from_original_class_name(&self, class_name: &str) -> Option<String>;
}

/// Every resource is a basic resource
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicProcessDelegate;

impl ProcessDelegate for BasicProcessDelegate {
    fn resource_from_original_class_name(&self, _class_name: &str) -> Option<String> {
        None
    }
}

/// Types the objects of the worker's built-in `fs` module
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProcessDelegate;

impl ProcessDelegate for FsProcessDelegate {
    fn resource_from_original_class_name(&self, class_name: &str) -> Option<String> {
        match class_name {
            "Stats" => Some(StatsResource::KIND.to_string()),
            _ => None,
        }
    }
}

/// Kind for `class_name` according to `delegate`
pub fn resource_kind(delegate: Option<&dyn ProcessDelegate>, class_name: &str) -> String {
    delegate
        .and_then(|delegate| delegate.resource_from_original_class_name(class_name))
        .unwrap_or_else(|| BASIC_RESOURCE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_delegate_types_stats() {
        assert_eq!(resource_kind(Some(&FsProcessDelegate), "Stats"), "StatsResource");
        assert_eq!(resource_kind(Some(&FsProcessDelegate), "Buffer"), BASIC_RESOURCE);
    }

    #[test]
    fn test_without_delegate_everything_is_basic() {
        assert_eq!(resource_kind(None, "Stats"), BASIC_RESOURCE);
        assert_eq!(resource_kind(Some(&BasicProcessDelegate), "Stats"), BASIC_RESOURCE);
    }
}
