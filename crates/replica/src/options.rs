//! Copy configuration.

/// What a deep copy does when it reaches an opaque handle.
///
/// Parses from and prints as `reject` / `pass_through`, so it can come straight
/// from a config file or a command-line flag.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HandlePolicy {
    /// Fail with `CopyError::UnsupportedType`.
    #[default]
    Reject,
    /// Treat the handle as a leaf: the copy refers to the original handle.
    PassThrough,
}

/// Options of one [`DeepCopier`](crate::DeepCopier).
///
/// Deserializes with every field optional:
///
/// ```
/// use replica::{CopyOptions, HandlePolicy};
///
/// let options: CopyOptions = serde_json::from_str(r#"{"handles": "pass_through"}"#).unwrap();
/// assert_eq!(options.handles, HandlePolicy::PassThrough);
/// assert!(options.leaf_array_fast_path);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CopyOptions {
    pub handles: HandlePolicy,
    /// Copy arrays of inline leaf elements with one buffer clone instead of
    /// visiting every element.
    pub leaf_array_fast_path: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            handles: HandlePolicy::Reject,
            leaf_array_fast_path: true,
        }
    }
}

impl CopyOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handles(mut self, policy: HandlePolicy) -> Self {
        self.handles = policy;
        self
    }

    #[must_use]
    pub fn with_leaf_array_fast_path(mut self, enabled: bool) -> Self {
        self.leaf_array_fast_path = enabled;
        self
    }
}
