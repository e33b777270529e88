//! Recursive-descent implementation of the name grammar: scale, canvas,
//! folder, and filename productions parsed out of one delimited segment
//! of a layer, layer-comp, or document-defaults name.
//!
//! There is no teacher precedent for a text grammar in this codebase; the
//! shape here is a small hand-written scanner plus a handful of anchored
//! regexes for the numeric sub-tokens (number, unit, percent, canvas),
//! built once behind `OnceLock` the way the engine builds its lazily
//! initialized Tokio runtime in `assets::io`.

use std::sync::OnceLock;

use regex::Regex;

use super::spec::{Canvas, Dimension, Specification, UnitAbbrev};
use crate::errors::AssetForgeError;

/// Outcome of parsing one `+`/`,`-delimited segment: either a spec or an error.
pub enum SegmentResult {
    Spec(Specification),
    Error(AssetForgeError),
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+(?:\.\d+)?|\.\d+)").unwrap())
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+(?:\.\d+)?|\.\d+)%").unwrap())
}

fn abs_scale_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<w>\?|(?:\d+(?:\.\d+)?|\.\d+)(?:[a-z]{2})?)x(?P<h>\?|(?:\d+(?:\.\d+)?|\.\d+)(?:[a-z]{2})?) ")
            .unwrap()
    })
}

/// Single-operand shorthand (`2x `): a uniform scale factor rather than an
/// absolute `WxH` pair, e.g. the `@2x` naming convention.
fn uniform_scale_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?P<n>\d+(?:\.\d+)?|\.\d+)x ").unwrap())
}

fn canvas4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[(?P<w>\d+(?:\.\d+)?)x(?P<h>\d+(?:\.\d+)?)(?P<xs>[+-])(?P<x>\d+(?:\.\d+)?)(?P<ys>[+-])(?P<y>\d+(?:\.\d+)?)\]",
        )
        .unwrap()
    })
}

fn canvas2_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(?P<w>\d+(?:\.\d+)?)x(?P<h>\d+(?:\.\d+)?)\]").unwrap())
}

fn canvas1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(?P<n>\d+(?:\.\d+)?)\]").unwrap())
}

fn folder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // goodcharsAndDots: anything but the top-level delimiters, control
    // characters, and the reserved filesystem characters.
    RE.get_or_init(|| Regex::new(r#"^([^,+/\x00-\x1F\\":*?<>!|]+)/"#).unwrap())
}

fn fileext_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<ext>[A-Za-z]+)(?:-(?P<qty>\d+(?:[a-zA-Z]|%)?))?$").unwrap())
}

/// Parses a leading absolute size component (`abscomp`): a bare number, a
/// number with a two-letter unit, or the wildcard `?`.
fn parse_abscomp(token: &str) -> Dimension {
    if token == "?" {
        return Dimension::wildcard();
    }
    let (num_part, unit_part) = if token.len() > 2 {
        let split_at = token.len() - 2;
        let (head, tail) = token.split_at(split_at);
        if UnitAbbrev::parse(tail).is_some() {
            (head, Some(tail))
        } else {
            (token, None)
        }
    } else {
        (token, None)
    };
    let value: f64 = num_part.parse().unwrap_or(0.0);
    Dimension::absolute(value, unit_part.and_then(UnitAbbrev::parse))
}

struct ScaleMatch {
    scale: Option<f64>,
    width: Option<Dimension>,
    height: Option<Dimension>,
    consumed: usize,
}

fn parse_scale(s: &str) -> Option<ScaleMatch> {
    if let Some(m) = percent_re().find(s) {
        let text = &m.as_str()[..m.as_str().len() - 1];
        let value: f64 = text.parse().ok()?;
        return Some(ScaleMatch { scale: Some(value / 100.0), width: None, height: None, consumed: m.end() });
    }
    if let Some(caps) = abs_scale_re().captures(s) {
        let whole = caps.get(0).unwrap();
        let width = parse_abscomp(&caps["w"]);
        let height = parse_abscomp(&caps["h"]);
        return Some(ScaleMatch { scale: None, width: Some(width), height: Some(height), consumed: whole.end() });
    }
    if let Some(caps) = uniform_scale_re().captures(s) {
        let whole = caps.get(0).unwrap();
        let value: f64 = caps["n"].parse().ok()?;
        return Some(ScaleMatch { scale: Some(value), width: None, height: None, consumed: whole.end() });
    }
    None
}

fn parse_canvas(s: &str) -> Option<(Canvas, usize)> {
    if let Some(caps) = canvas4_re().captures(s) {
        let whole = caps.get(0).unwrap();
        let width: f64 = caps["w"].parse().ok()?;
        let height: f64 = caps["h"].parse().ok()?;
        let mut x: f64 = caps["x"].parse().ok()?;
        let mut y: f64 = caps["y"].parse().ok()?;
        if &caps["xs"] == "-" {
            x = -x;
        }
        if &caps["ys"] == "-" {
            y = -y;
        }
        return Some((Canvas { width, height, x_offset: x, y_offset: y }, whole.end()));
    }
    if let Some(caps) = canvas2_re().captures(s) {
        let whole = caps.get(0).unwrap();
        let width: f64 = caps["w"].parse().ok()?;
        let height: f64 = caps["h"].parse().ok()?;
        return Some((Canvas { width, height, x_offset: 0.0, y_offset: 0.0 }, whole.end()));
    }
    if let Some(caps) = canvas1_re().captures(s) {
        let whole = caps.get(0).unwrap();
        let n: f64 = caps["n"].parse().ok()?;
        return Some((Canvas { width: n, height: n, x_offset: 0.0, y_offset: 0.0 }, whole.end()));
    }
    None
}

fn skip_ws(s: &str) -> &str {
    s.trim_start_matches([' ', '\t'])
}

struct Prefix {
    scale: Option<f64>,
    width: Option<Dimension>,
    height: Option<Dimension>,
    canvas: Option<Canvas>,
    folder: Vec<String>,
    rest: String,
}

/// Consumes `scale? SP* canvas? SP* folder*` from the front of `s` and
/// returns the remainder, which should be a filename (or, in defaults
/// context, a suffix).
fn parse_prefix(s: &str) -> Prefix {
    let mut cur = skip_ws(s);
    let mut scale = None;
    let mut width = None;
    let mut height = None;
    let mut canvas = None;
    let mut folder = Vec::new();

    if let Some(m) = parse_scale(cur) {
        scale = m.scale;
        width = m.width;
        height = m.height;
        cur = &cur[m.consumed..];
        cur = skip_ws(cur);
    }
    if let Some((c, consumed)) = parse_canvas(cur) {
        canvas = Some(c);
        cur = &cur[consumed..];
        cur = skip_ws(cur);
    }
    while let Some(caps) = folder_re().captures(cur) {
        let whole = caps.get(0).unwrap();
        let name = caps[1].to_string();
        if name.starts_with('.') {
            break;
        }
        folder.push(name);
        cur = &cur[whole.end()..];
    }

    Prefix { scale, width, height, canvas, folder, rest: cur.to_string() }
}

struct FilenameParts {
    file: String,
    extension: String,
    quality: Option<String>,
}

/// Parses `(goodchars ".")+ fileext` out of an already-trimmed token.
fn parse_filename(candidate: &str) -> Option<FilenameParts> {
    if candidate.is_empty() {
        return None;
    }
    let dot_idx = candidate.rfind('.')?;
    let stem = &candidate[..dot_idx];
    let ext_part = &candidate[dot_idx + 1..];
    if stem.is_empty() {
        return None;
    }
    let caps = fileext_re().captures(ext_part)?;
    let extension = caps["ext"].to_ascii_lowercase();
    let quality = caps.name("qty").map(|m| m.as_str().to_string());
    let file = Specification::sanitize_segment(&format!("{stem}.{extension}"));
    Some(FilenameParts { file, extension, quality })
}

/// Parses one non-defaults segment: a `filespec` if the filename
/// production matches, otherwise a verbatim `unparsedname`.
pub fn parse_plain_segment(raw: &str) -> SegmentResult {
    let prefix = parse_prefix(raw);
    let starts_with_ws = prefix.rest.starts_with([' ', '\t']);
    let trimmed = prefix.rest.trim();

    match parse_filename(trimmed) {
        None => SegmentResult::Spec(Specification { name: raw.trim().to_string(), ..Default::default() }),
        Some(_parts) if starts_with_ws => SegmentResult::Error(AssetForgeError::FilenameBeginsWithWhitespace),
        Some(parts) => SegmentResult::Spec(Specification {
            file: Some(parts.file),
            extension: Some(parts.extension),
            quality: parts.quality,
            folder: prefix.folder,
            scale: prefix.scale,
            width: prefix.width,
            height: prefix.height,
            canvas: prefix.canvas,
            default: false,
            suffix: None,
            name: raw.trim().to_string(),
        }),
    }
}

/// Parses one `defaultspec` segment: requires at least one of
/// scale/folder/suffix to be present.
pub fn parse_default_segment(raw: &str) -> SegmentResult {
    let prefix = parse_prefix(raw);
    let suffix = {
        let trimmed = prefix.rest.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    };
    if prefix.scale.is_none() && prefix.width.is_none() && prefix.folder.is_empty() && suffix.is_none() {
        return SegmentResult::Error(AssetForgeError::ParseError {
            segment: raw.to_string(),
            reason: "empty default specification".to_string(),
        });
    }
    SegmentResult::Spec(Specification {
        file: None,
        extension: None,
        quality: None,
        folder: prefix.folder,
        scale: prefix.scale,
        width: prefix.width,
        height: prefix.height,
        canvas: prefix.canvas,
        default: true,
        suffix,
        name: raw.trim().to_string(),
    })
}

/// Splits a name on top-level `+`/`,` delimiters. Neither character can
/// appear inside a segment (`goodchar` excludes both), so a plain split
/// is sufficient — there is no quoting or escaping in this grammar.
pub fn split_segments(s: &str) -> Vec<&str> {
    s.split(['+', ',']).collect()
}

/// True when `raw` begins with the literal `default` keyword followed by
/// at least one space, i.e. matches the `defaults` production's prefix.
pub fn starts_with_defaults_keyword(raw: &str) -> bool {
    raw.strip_prefix("default").is_some_and(|rest| rest.starts_with([' ', '\t']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_filename() {
        match parse_plain_segment("logo.png") {
            SegmentResult::Spec(spec) => {
                assert_eq!(spec.file.as_deref(), Some("logo.png"));
                assert_eq!(spec.extension.as_deref(), Some("png"));
                assert!(spec.is_basic());
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn percent_scale() {
        match parse_plain_segment(" 50% thumbs/small.jpg-80%") {
            SegmentResult::Spec(spec) => {
                assert_eq!(spec.scale, Some(0.5));
                assert_eq!(spec.folder, vec!["thumbs".to_string()]);
                assert_eq!(spec.file.as_deref(), Some("small.jpg"));
                assert_eq!(spec.quality.as_deref(), Some("80%"));
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn uniform_scale_shorthand() {
        match parse_plain_segment("2x logo@2x.png") {
            SegmentResult::Spec(spec) => {
                assert_eq!(spec.scale, Some(2.0));
                assert!(spec.width.is_none());
                assert_eq!(spec.file.as_deref(), Some("logo@2x.png"));
                assert_eq!(spec.extension.as_deref(), Some("png"));
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn absolute_scale_with_units() {
        match parse_plain_segment("200x150 hero.png") {
            SegmentResult::Spec(spec) => {
                assert_eq!(spec.width.unwrap().value, Some(200.0));
                assert_eq!(spec.height.unwrap().value, Some(150.0));
                assert_eq!(spec.file.as_deref(), Some("hero.png"));
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn canvas_four_value() {
        match parse_plain_segment("[100x200+5-10] hero.png") {
            SegmentResult::Spec(spec) => {
                let canvas = spec.canvas.unwrap();
                assert_eq!(canvas.width, 100.0);
                assert_eq!(canvas.height, 200.0);
                assert_eq!(canvas.x_offset, 5.0);
                assert_eq!(canvas.y_offset, -10.0);
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn canvas_square_short_form() {
        match parse_plain_segment("[64] icon.png") {
            SegmentResult::Spec(spec) => {
                let canvas = spec.canvas.unwrap();
                assert_eq!(canvas.width, 64.0);
                assert_eq!(canvas.height, 64.0);
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn non_filename_text_is_unparsed() {
        match parse_plain_segment("Background") {
            SegmentResult::Spec(spec) => {
                assert!(spec.file.is_none());
                assert_eq!(spec.name, "Background");
            }
            SegmentResult::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn filename_with_extra_whitespace_errors() {
        match parse_plain_segment("50%  icon.png") {
            SegmentResult::Error(AssetForgeError::FilenameBeginsWithWhitespace) => {}
            _ => panic!("expected a leading-whitespace error"),
        }
    }

    #[test]
    fn defaults_keyword_detection() {
        assert!(starts_with_defaults_keyword("default 50% thumbs/"));
        assert!(!starts_with_defaults_keyword("defaulter.png"));
        assert!(!starts_with_defaults_keyword("logo.png"));
    }

    #[test]
    fn default_segment_requires_content() {
        match parse_default_segment("   ") {
            SegmentResult::Error(_) => {}
            SegmentResult::Spec(_) => panic!("expected error for empty default spec"),
        }
    }
}
