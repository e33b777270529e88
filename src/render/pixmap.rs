//! Pixmap render settings derivation.
//!
//! No teacher precedent for a pixmap path exists in this codebase; the
//! interpolation/dither flags are forwarded verbatim from [`Config`] into
//! a host-side rasterizer call, and the exact-vs-approximate bounds
//! decision and the unit conversion table are new to this crate.

use crate::config::{Config, InterpolationType};
use crate::document::{Layer, Rect};
use crate::parser::{Dimension, Specification};

/// Everything the host needs to produce one pixmap.
#[derive(Debug, Clone, PartialEq)]
pub struct PixmapSettings {
    /// Document-space rectangle the host should sample from. When
    /// `exact` is true this must be resolved by the host itself (mask
    /// and effect bounds live there, not in this crate's tree mirror);
    /// otherwise it is `layer.bounds` scaled by `scale_x`/`scale_y`.
    pub exact_bounds_required: bool,
    pub scale_x: f64,
    pub scale_y: f64,
    pub quality: Option<String>,
    pub use_smart_scaling: bool,
    pub include_ancestor_masks: bool,
    pub allow_dither: bool,
    pub use_color_settings_dither: bool,
    pub interpolation_type: InterpolationType,
    pub use_psd_smart_object_pixel_scaling: bool,
}

/// Computes pixmap settings for `spec` against `layer` at the document's
/// current `resolution` (ppi). Returns `None` when the resulting bounds
/// would be degenerate and the render must be refused.
#[must_use]
pub fn compute_pixmap_settings(layer: &Layer, spec: &Specification, resolution: f64, config: &Config) -> Option<PixmapSettings> {
    if layer.bounds.is_degenerate() {
        return None;
    }

    let (mut scale_x, mut scale_y) = resolve_scale(spec, layer.bounds, resolution);

    // A spec naming only one of width/height is a uniform scale request:
    // square up the other axis so the asset isn't stretched.
    if spec.width.is_some() && spec.height.is_none() {
        scale_y = scale_x;
    } else if spec.height.is_some() && spec.width.is_none() {
        scale_x = scale_y;
    }

    if scale_x <= 0.0 || scale_y <= 0.0 {
        return None;
    }

    let approx = layer.bounds.scaled(scale_x.max(scale_y));
    if approx.is_degenerate() {
        return None;
    }

    let exact_bounds_required = requires_exact_bounds(spec, layer, config, scale_x, scale_y);

    Some(PixmapSettings {
        exact_bounds_required,
        scale_x,
        scale_y,
        quality: spec.quality.clone(),
        use_smart_scaling: config.use_smart_scaling,
        include_ancestor_masks: config.include_ancestor_masks,
        allow_dither: config.allow_dither,
        // Pinned false whenever dithering is disabled outright; the host's
        // own color-settings dither toggle must not silently reintroduce it.
        use_color_settings_dither: config.allow_dither,
        interpolation_type: config.interpolation_type,
        use_psd_smart_object_pixel_scaling: config.use_psd_smart_object_pixel_scaling,
    })
}

fn resolve_scale(spec: &Specification, bounds: Rect, resolution: f64) -> (f64, f64) {
    if let Some(scale) = spec.scale {
        return (scale, scale);
    }
    let sx = spec.width.and_then(|d| absolute_scale(d, bounds.width(), resolution));
    let sy = spec.height.and_then(|d| absolute_scale(d, bounds.height(), resolution));
    (sx.unwrap_or(1.0), sy.unwrap_or(1.0))
}

fn absolute_scale(dim: Dimension, extent_px: f64, resolution: f64) -> Option<f64> {
    let value = dim.value?;
    if extent_px <= 0.0 {
        return None;
    }
    let unit = dim.unit.map_or(1.0, |u| u.pixels_per_unit(resolution));
    Some((value * unit) / extent_px)
}

/// A render needs the host to resolve exact (mask/effect-aware) bounds
/// when the caller asked for an explicit size, a non-integer scale, or
/// when a mask/effect/ancestor-mask would otherwise be silently dropped
/// from an approximate crop.
fn requires_exact_bounds(spec: &Specification, layer: &Layer, config: &Config, scale_x: f64, scale_y: f64) -> bool {
    if spec.width.is_some() || spec.height.is_some() {
        return true;
    }
    if (scale_x.fract().abs() > f64::EPSILON) || (scale_y.fract().abs() > f64::EPSILON) {
        return true;
    }
    if layer.has_enabled_mask() || layer.has_enabled_effects() {
        return true;
    }
    config.include_ancestor_masks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LayerKind;
    use slotmap::SlotMap;

    fn layer_with_bounds(bounds: Rect) -> Layer {
        let mut map: SlotMap<crate::document::LayerId, ()> = SlotMap::with_key();
        let id = map.insert(());
        let mut layer = Layer::new(id, LayerKind::Raster, "logo");
        layer.bounds = bounds;
        layer.bounds_with_effects = bounds;
        layer
    }

    #[test]
    fn percent_scale_uses_approximate_bounds() {
        let layer = layer_with_bounds(Rect { left: 0.0, top: 0.0, right: 100.0, bottom: 50.0 });
        let spec = Specification { scale: Some(0.5), ..Default::default() };
        let settings = compute_pixmap_settings(&layer, &spec, 72.0, &Config::default()).unwrap();
        assert!(!settings.exact_bounds_required);
        assert_eq!(settings.scale_x, 0.5);
        assert_eq!(settings.scale_y, 0.5);
    }

    #[test]
    fn explicit_width_requires_exact_bounds_and_squares_the_other_axis() {
        let layer = layer_with_bounds(Rect { left: 0.0, top: 0.0, right: 100.0, bottom: 50.0 });
        let spec = Specification { width: Some(Dimension::absolute(200.0, None)), ..Default::default() };
        let settings = compute_pixmap_settings(&layer, &spec, 72.0, &Config::default()).unwrap();
        assert!(settings.exact_bounds_required);
        assert_eq!(settings.scale_x, 2.0);
        assert_eq!(settings.scale_y, 2.0);
    }

    #[test]
    fn degenerate_bounds_are_refused() {
        let layer = layer_with_bounds(Rect { left: 10.0, top: 10.0, right: 10.0, bottom: 20.0 });
        let spec = Specification { file: Some("a.png".into()), ..Default::default() };
        assert!(compute_pixmap_settings(&layer, &spec, 72.0, &Config::default()).is_none());
    }

    #[test]
    fn enabled_mask_forces_exact_bounds_even_at_integer_scale() {
        let mut layer = layer_with_bounds(Rect { left: 0.0, top: 0.0, right: 100.0, bottom: 100.0 });
        layer.mask = Some(crate::document::Mask { bounds: layer.bounds, enabled: true });
        let spec = Specification { scale: Some(1.0), ..Default::default() };
        let settings = compute_pixmap_settings(&layer, &spec, 72.0, &Config::default()).unwrap();
        assert!(settings.exact_bounds_required);
    }
}
