//! Configuration for the class transformer.
//!
//! [`TransformerConfig`] controls the naming of generated members, whether
//! backward-compatibility shims are instrumented and whether the class is
//! transformed in place or as a renamed duplicate. It can be built in code or
//! deserialized from JSON; missing keys take their default values.

use serde::Deserialize;

use crate::{metadata::identity::MethodId, Result};

/// Suffix appended to renamed methods and generated members.
pub const DEFAULT_SUFFIX: &str = "$$cc_transformed";

/// Suffix appended to the name of a duplicated class.
pub const DUPLICATE_SUFFIX: &str = "_transformed";

/// Options for one transformation run.
///
/// # Examples
///
/// ```rust
/// use typesplit::compiler::TransformerConfig;
///
/// let config: TransformerConfig = serde_json::from_str(
///     r#"{ "add_safety": true, "warning_hook": "s net/example/Hooks#warn (Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V" }"#,
/// ).unwrap();
/// assert!(config.add_safety);
/// assert_eq!(config.transformed_suffix, "$$cc_transformed");
/// assert!(config.warning_hook().unwrap().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Instrument original entry points whose descriptor changed: when they
    /// run on an instance holding transformed state they report the call and
    /// forward to the transformed method with converted arguments (default: false).
    pub add_safety: bool,

    /// Static method invoked as `(owner, name, descriptor)` by instrumented
    /// entry points, in `"s owner#name desc"` form. `None` forwards silently.
    pub warning_hook: Option<String>,

    /// Suffix for methods whose descriptor did not change and must be renamed
    /// (default: `$$cc_transformed`).
    pub transformed_suffix: String,

    /// Name of the boolean instance field recording whether an object holds
    /// transformed field values (default: `isTransformed$$cc_transformed`).
    pub safety_field: String,

    /// Transform a copy of the class named `<name><duplicate_suffix>`
    /// instead of the class itself. The copy holds only transformed code, so
    /// it needs neither shims nor a safety flag (default: false).
    pub duplicate_class: bool,

    /// Suffix for the duplicated class (default: `_transformed`).
    pub duplicate_suffix: String,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            add_safety: false,
            warning_hook: None,
            transformed_suffix: DEFAULT_SUFFIX.to_string(),
            safety_field: format!("isTransformed{DEFAULT_SUFFIX}"),
            duplicate_class: false,
            duplicate_suffix: DUPLICATE_SUFFIX.to_string(),
        }
    }
}

impl TransformerConfig {
    /// Instrumented preset: original entry points forward with conversion.
    #[must_use]
    pub fn safe() -> Self {
        Self {
            add_safety: true,
            ..Self::default()
        }
    }

    /// Duplicating preset: the class is copied under a new name and the copy
    /// is transformed.
    #[must_use]
    pub fn duplicate() -> Self {
        Self {
            duplicate_class: true,
            ..Self::default()
        }
    }

    /// Checks that the options can be combined.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if a duplicated class is also asked
    /// to instrument entry points, or the duplicate suffix is empty.
    pub fn validate(&self) -> Result<()> {
        if self.duplicate_class && self.add_safety {
            return Err(crate::Error::Config(
                "a duplicated class cannot also carry safety checks".to_string(),
            ));
        }
        if self.duplicate_class && self.duplicate_suffix.is_empty() {
            return Err(crate::Error::Config("duplicate suffix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Sets the warning hook method.
    #[must_use]
    pub fn with_warning_hook(mut self, hook: impl Into<String>) -> Self {
        self.warning_hook = Some(hook.into());
        self
    }

    /// The parsed warning hook.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the reference cannot be parsed or the
    /// hook is not a static `(String, String, String)V` method.
    pub fn warning_hook(&self) -> Result<Option<MethodId>> {
        let Some(text) = &self.warning_hook else {
            return Ok(None);
        };
        let hook: MethodId = text.parse()?;
        let expected = "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V";
        if !hook.is_static() || hook.desc.to_string() != expected {
            return Err(crate::Error::Config(format!(
                "warning hook {hook} must be a static {expected} method"
            )));
        }
        Ok(Some(hook))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_presets() {
        let config = TransformerConfig::default();
        assert!(!config.add_safety);
        assert_eq!(config.safety_field, "isTransformed$$cc_transformed");
        assert!(config.warning_hook().unwrap().is_none());
        assert!(TransformerConfig::safe().add_safety);
        assert!(TransformerConfig::duplicate().validate().is_ok());
    }

    #[test]
    fn test_duplicate_excludes_safety() {
        let config: TransformerConfig =
            serde_json::from_str(r#"{ "duplicate_class": true, "add_safety": true }"#).unwrap();
        assert_eq!(config.duplicate_suffix, "_transformed");
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        let unnamed = TransformerConfig {
            duplicate_suffix: String::new(),
            ..TransformerConfig::duplicate()
        };
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: TransformerConfig =
            serde_json::from_str(r#"{ "transformed_suffix": "$split" }"#).unwrap();
        assert_eq!(config.transformed_suffix, "$split");
        assert!(!config.add_safety);
    }

    #[test]
    fn test_hook_validation() {
        let bad = TransformerConfig::default().with_warning_hook("v a/Hooks#warn ()V");
        assert!(bad.warning_hook().is_err());
        let good = TransformerConfig::default().with_warning_hook(
            "s a/Hooks#warn (Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V",
        );
        assert_eq!(good.warning_hook().unwrap().unwrap().name, "warn");
    }
}
