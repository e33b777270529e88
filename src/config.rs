//! Process Configuration
//!
//! Recognized per-process options. Unknown keys in the host-provided
//! settings blob are ignored rather than rejected: we deserialize with
//! plain `serde_json::from_value`, deliberately not `deny_unknown_fields`,
//! so a host shipping newer keys than this crate knows about still works.

use serde::{Deserialize, Serialize};

/// Interpolation strategy forwarded to the host's pixmap renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationType {
    Bicubic,
    NearestNeighbor,
    Bilinear,
}

impl Default for InterpolationType {
    fn default() -> Self {
        Self::Bicubic
    }
}

/// Process-wide configuration, read once at startup from the host's
/// settings blob and shared (read-only) across every document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub use_smart_scaling: bool,
    pub include_ancestor_masks: bool,
    pub allow_dither: bool,
    pub use_psd_smart_object_pixel_scaling: bool,
    pub interpolation_type: InterpolationType,
    pub meta_data_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_smart_scaling: false,
            include_ancestor_masks: false,
            allow_dither: false,
            use_psd_smart_object_pixel_scaling: false,
            interpolation_type: InterpolationType::default(),
            meta_data_root: "crema".to_string(),
        }
    }
}

impl Config {
    /// Parses a host-provided settings blob, falling back to defaults for
    /// anything missing or malformed. A malformed blob never fails startup;
    /// it just yields the default configuration.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_else(|err| {
            log::warn!("failed to parse configuration, using defaults: {err}");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let cfg = Config::default();
        assert!(!cfg.use_smart_scaling);
        assert!(!cfg.include_ancestor_masks);
        assert_eq!(cfg.meta_data_root, "crema");
        assert_eq!(cfg.interpolation_type, InterpolationType::Bicubic);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let value = serde_json::json!({
            "use-smart-scaling": true,
            "totally-unknown-key": 42,
        });
        let cfg = Config::from_json(&value);
        assert!(cfg.use_smart_scaling);
    }

    #[test]
    fn malformed_blob_falls_back_to_defaults() {
        let value = serde_json::json!({"allow-dither": "not-a-bool"});
        let cfg = Config::from_json(&value);
        assert_eq!(cfg, Config::default());
    }
}
