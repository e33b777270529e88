//! Name Parser
//!
//! Parses a single layer, layer-comp, or document-defaults name string into
//! zero or more [`Specification`]s, or into structured parse errors.
//!
//! # Failure model
//!
//! A malformed `+`/`,`-delimited segment fails on its own; the other
//! segments in the same name still parse normally. Errors are returned
//! alongside any specs that did parse, never as an early return.

mod grammar;
mod spec;

pub use spec::{Canvas, Dimension, Specification, UnitAbbrev, FORBIDDEN_FILE_CHARS};

use crate::errors::AssetForgeError;
use grammar::SegmentResult;

/// Result of parsing one name: every spec that parsed, plus every error
/// raised along the way.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub specs: Vec<Specification>,
    pub errors: Vec<AssetForgeError>,
}

impl ParseOutput {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parses `raw`. `allow_defaults` is true only for the single document
/// source designated to carry document-level defaults; every layer and
/// layer-comp name passes `false`, so a
/// `default ...`-shaped name there raises
/// [`AssetForgeError::DefaultsInLayerComp`] instead of being honored.
#[must_use]
pub fn parse_name(raw: &str, allow_defaults: bool) -> ParseOutput {
    if grammar::starts_with_defaults_keyword(raw) {
        if !allow_defaults {
            return ParseOutput { specs: Vec::new(), errors: vec![AssetForgeError::DefaultsInLayerComp] };
        }
        let remainder = &raw["default".len()..];
        let mut out = ParseOutput::default();
        for segment in grammar::split_segments(remainder) {
            if segment.trim().is_empty() {
                continue;
            }
            match grammar::parse_default_segment(segment) {
                SegmentResult::Spec(spec) => out.specs.push(spec),
                SegmentResult::Error(err) => out.errors.push(err),
            }
        }
        return out;
    }

    let mut out = ParseOutput::default();
    for segment in grammar::split_segments(raw) {
        if segment.trim().is_empty() {
            continue;
        }
        match grammar::parse_plain_segment(segment) {
            SegmentResult::Spec(spec) => out.specs.push(spec),
            SegmentResult::Error(err) => out.errors.push(err),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_percent_and_pixel_scale_segments_with_folder_and_quality() {
        let out = parse_name("logo.png, 2x logo@2x.png + 50% thumbs/small.jpg-80%", false);
        assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
        assert_eq!(out.specs.len(), 3);

        assert_eq!(out.specs[0].file.as_deref(), Some("logo.png"));
        assert_eq!(out.specs[0].extension.as_deref(), Some("png"));
        assert!(out.specs[0].is_basic());

        assert_eq!(out.specs[1].file.as_deref(), Some("logo@2x.png"));
        assert_eq!(out.specs[1].extension.as_deref(), Some("png"));
        assert_eq!(out.specs[1].scale, Some(2.0));

        assert_eq!(out.specs[2].file.as_deref(), Some("small.jpg"));
        assert_eq!(out.specs[2].folder, vec!["thumbs".to_string()]);
        assert_eq!(out.specs[2].scale, Some(0.5));
        assert_eq!(out.specs[2].quality.as_deref(), Some("80%"));
    }

    #[test]
    fn parses_explicit_canvas_directive_with_offsets() {
        let out = parse_name("[100x200+5-10] hero.png", false);
        assert!(out.errors.is_empty());
        let spec = &out.specs[0];
        assert_eq!(spec.file.as_deref(), Some("hero.png"));
        let canvas = spec.canvas.unwrap();
        assert_eq!((canvas.width, canvas.height, canvas.x_offset, canvas.y_offset), (100.0, 200.0, 5.0, -10.0));
    }

    /// Only parsing is covered here; the registry reset behavior a
    /// `default ...` name triggers is tested alongside the registry.
    #[test]
    fn parses_defaults_prefixed_name_into_a_default_spec() {
        let out = parse_name("default 50% thumbs/", true);
        assert!(out.errors.is_empty());
        assert_eq!(out.specs.len(), 1);
        let spec = &out.specs[0];
        assert!(spec.default);
        assert_eq!(spec.scale, Some(0.5));
        assert_eq!(spec.folder, vec!["thumbs".to_string()]);
    }

    #[test]
    fn defaults_in_layer_comp_is_an_error() {
        let out = parse_name("default 50% thumbs/", false);
        assert_eq!(out.specs.len(), 0);
        assert!(matches!(out.errors[0], AssetForgeError::DefaultsInLayerComp));
    }

    #[test]
    fn extra_delimiters_are_skipped_not_errors() {
        let out = parse_name("logo.png ++ icon.png", false);
        assert!(out.errors.is_empty());
        assert_eq!(out.specs.len(), 2);
        assert_eq!(out.specs[0].file.as_deref(), Some("logo.png"));
        assert_eq!(out.specs[1].file.as_deref(), Some("icon.png"));
    }

    #[test]
    fn a_genuinely_malformed_segment_errors_independently() {
        let out = parse_name("logo.png + 50%  icon.png", false);
        assert_eq!(out.specs.len(), 1);
        assert_eq!(out.specs[0].file.as_deref(), Some("logo.png"));
        assert_eq!(out.errors.len(), 1);
        assert!(matches!(out.errors[0], AssetForgeError::FilenameBeginsWithWhitespace));
    }

    /// Re-serializing a parsed spec and parsing it again yields an
    /// equivalent spec.
    #[test]
    fn round_trip_canonical_serialization() {
        let out = parse_name("logo.png, 2x logo@2x.png + 50% thumbs/small.jpg-80%", false);
        for spec in &out.specs {
            let canonical = spec.to_canonical_name();
            let reparsed = parse_name(&canonical, false);
            assert_eq!(reparsed.errors.len(), 0, "re-parse of {canonical:?} produced errors");
            assert_eq!(reparsed.specs.len(), 1, "re-parse of {canonical:?} did not yield exactly one spec");
            assert_eq!(&reparsed.specs[0].file, &spec.file);
            assert_eq!(&reparsed.specs[0].extension, &spec.extension);
            assert_eq!(&reparsed.specs[0].scale, &spec.scale);
            assert_eq!(&reparsed.specs[0].folder, &spec.folder);
        }
    }
}
