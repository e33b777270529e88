//! Specification value types.
//!
//! A [`Specification`] is the normalized record the grammar in
//! [`grammar`](super::grammar) produces from one comma/plus-delimited
//! segment of a layer, layer-comp, or document-defaults name.

use std::fmt::Write as _;

/// Characters that are never allowed in a filename or folder segment on
/// disk; normalization replaces each with `_`.
pub const FORBIDDEN_FILE_CHARS: &[char] = &['\\', '"', ':', '*', '?', '<', '>', '!', '|'];

/// One component of an absolute `WxH` size. `value` is `None` for the
/// wildcard component `?`, which carries no unit either.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimension {
    pub value: Option<f64>,
    pub unit: Option<UnitAbbrev>,
}

impl Dimension {
    pub const fn wildcard() -> Self {
        Self { value: None, unit: None }
    }

    pub const fn absolute(value: f64, unit: Option<UnitAbbrev>) -> Self {
        Self { value: Some(value), unit }
    }
}

/// A recognized two-letter unit abbreviation. Unknown two-letter
/// abbreviations are accepted by the grammar but logged and treated as
/// pixels at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAbbrev {
    Px,
    In,
    Cm,
    Mm,
    Unknown([u8; 2]),
}

impl UnitAbbrev {
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(|b| b.is_ascii_lowercase()) {
            return None;
        }
        Some(match s {
            "px" => Self::Px,
            "in" => Self::In,
            "cm" => Self::Cm,
            "mm" => Self::Mm,
            _ => Self::Unknown([bytes[0], bytes[1]]),
        })
    }

    /// Pixels-per-unit at the given document resolution (ppi).
    #[must_use]
    pub fn pixels_per_unit(self, ppi: f64) -> f64 {
        match self {
            Self::Px => 1.0,
            Self::In => ppi,
            Self::Cm => ppi / 2.54,
            Self::Mm => ppi / 25.4,
            Self::Unknown(_) => 1.0,
        }
    }

    #[must_use]
    pub fn as_str(self) -> String {
        match self {
            Self::Px => "px".to_string(),
            Self::In => "in".to_string(),
            Self::Cm => "cm".to_string(),
            Self::Mm => "mm".to_string(),
            Self::Unknown(b) => String::from_utf8_lossy(&b).into_owned(),
        }
    }
}

/// An explicit canvas size/offset directive, `[WxH+X+Y]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    pub x_offset: f64,
    pub y_offset: f64,
}

/// A single normalized asset directive parsed out of a layer/comp name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Specification {
    /// Normalized filename including extension, e.g. `"logo@2x.png"`.
    pub file: Option<String>,
    /// Lowercased extension, e.g. `"png"`.
    pub extension: Option<String>,
    /// Raw quality suffix text, without its separating hyphen, e.g. `"80%"`.
    pub quality: Option<String>,
    /// Ordered subfolder names, outermost first.
    pub folder: Vec<String>,
    /// Uniform scale multiplier (`30%` → `0.30`). Mutually exclusive with
    /// `width`/`height` per the grammar.
    pub scale: Option<f64>,
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub canvas: Option<Canvas>,
    /// True when this spec came from a `default ...` prefix.
    pub default: bool,
    /// Free-form trailing text captured for a `defaultspec` with no
    /// scale/folder, e.g. naming a non-geometric default variant.
    pub suffix: Option<String>,
    /// The original raw segment text, verbatim, for error reporting and
    /// for `unparsedname` specs that carry no file.
    pub name: String,
}

impl Specification {
    /// A spec is *basic* when it carries no scaling information at all;
    /// every other spec is *derived* from a basic peer with the same
    /// `file` stem (same `file`, exactly one of the pair unscaled).
    #[must_use]
    pub fn is_basic(&self) -> bool {
        self.scale.is_none() && self.width.is_none() && self.height.is_none()
    }

    /// Whether the spec has enough information to name a concrete asset.
    /// Plain descriptive layer names parse to an `unparsedname` spec with
    /// no `file`; those never become components.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.file.is_some()
    }

    /// `join(folder, file)`, the path relative to the base directory.
    #[must_use]
    pub fn asset_path(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        if self.folder.is_empty() {
            Some(file.clone())
        } else {
            Some(format!("{}/{}", self.folder.join("/"), file))
        }
    }

    /// Sanitizes a filename or folder segment by replacing every
    /// forbidden character with `_`.
    #[must_use]
    pub fn sanitize_segment(segment: &str) -> String {
        segment
            .chars()
            .map(|c| if FORBIDDEN_FILE_CHARS.contains(&c) { '_' } else { c })
            .collect()
    }

    /// Re-serializes this spec into a canonical name fragment. Used only
    /// by the round-trip property test; never part of the host-facing
    /// API, so no attempt is made to exactly reproduce the author's
    /// original formatting.
    #[must_use]
    pub fn to_canonical_name(&self) -> String {
        let mut out = String::new();
        if self.default {
            out.push_str("default ");
        }
        if let Some(scale) = self.scale {
            let _ = write!(out, "{}% ", trim_float(scale * 100.0));
        } else if self.width.is_some() || self.height.is_some() {
            let w = dimension_to_string(self.width);
            let h = dimension_to_string(self.height);
            let _ = write!(out, "{w}x{h} ");
        }
        if let Some(canvas) = self.canvas {
            let _ = write!(
                out,
                "[{}x{}{}{}{}{}] ",
                trim_float(canvas.width),
                trim_float(canvas.height),
                if canvas.x_offset >= 0.0 { "+" } else { "-" },
                trim_float(canvas.x_offset.abs()),
                if canvas.y_offset >= 0.0 { "+" } else { "-" },
                trim_float(canvas.y_offset.abs()),
            );
        }
        for folder in &self.folder {
            let _ = write!(out, "{folder}/");
        }
        if let Some(file) = &self.file {
            out.push_str(file);
            if let Some(quality) = &self.quality {
                let _ = write!(out, "-{quality}");
            }
        } else if let Some(suffix) = &self.suffix {
            out.push_str(suffix);
        } else {
            out.push_str(self.name.trim());
        }
        out.trim().to_string()
    }
}

fn dimension_to_string(dim: Option<Dimension>) -> String {
    match dim {
        None | Some(Dimension { value: None, .. }) => "?".to_string(),
        Some(Dimension { value: Some(v), unit }) => {
            let mut s = trim_float(v);
            if let Some(unit) = unit {
                s.push_str(&unit.as_str());
            }
            s
        }
    }
}

fn trim_float(v: f64) -> String {
    if (v - v.round()).abs() < f64::EPSILON {
        format!("{}", v.round() as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_path_joins_folder_and_file() {
        let spec = Specification {
            file: Some("small.jpg".to_string()),
            folder: vec!["thumbs".to_string()],
            ..Default::default()
        };
        assert_eq!(spec.asset_path().as_deref(), Some("thumbs/small.jpg"));
    }

    #[test]
    fn sanitize_replaces_forbidden_characters() {
        assert_eq!(Specification::sanitize_segment("a:b*c"), "a_b_c");
    }

    #[test]
    fn basic_vs_derived() {
        let basic = Specification { file: Some("a.png".into()), ..Default::default() };
        assert!(basic.is_basic());
        let derived = Specification { file: Some("a.png".into()), scale: Some(0.5), ..Default::default() };
        assert!(!derived.is_basic());
    }
}
