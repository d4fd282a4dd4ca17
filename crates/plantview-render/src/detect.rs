//! PlantUML source detection and normalisation
//!
//! Pure functions over the diagram text. Nothing here touches the engine:
//! the classifier exists so obviously invalid text never reaches it, and the
//! normaliser makes sure whatever does reach it carries a marker pair.

use crate::types::{OutputFormat, QualityOptions};

/// Opening diagram marker
pub const START_MARKER: &str = "@startuml";
/// Closing diagram marker
pub const END_MARKER: &str = "@enduml";

/// Substrings that mark text as probable PlantUML
const DIAGRAM_HINTS: &[&str] = &[
    "->",
    "-->",
    "skinparam",
    "class ",
    "actor ",
    "usecase ",
    "rectangle ",
    "interface ",
    "note ",
    "partition ",
];

/// Heuristic "is this PlantUML" classifier
///
/// Blank text is rejected. Text carrying both markers is accepted. Anything
/// else is accepted only if it contains an arrow or a common keyword.
pub fn looks_like_plantuml(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if has_markers(text) {
        return true;
    }
    DIAGRAM_HINTS.iter().any(|hint| text.contains(hint))
}

/// Check whether both diagram markers are present
pub fn has_markers(text: &str) -> bool {
    text.contains(START_MARKER) && text.contains(END_MARKER)
}

/// Produce the text handed to the engine
///
/// Surrounding whitespace is trimmed and missing markers are added. The
/// caller's buffer is borrowed, never modified.
pub fn normalize(text: &str) -> String {
    let text = text.trim();
    match (text.contains(START_MARKER), text.contains(END_MARKER)) {
        (true, true) => text.to_string(),
        (true, false) => format!("{}\n{}", text, END_MARKER),
        (false, true) => format!("{}\n{}", START_MARKER, text),
        (false, false) => format!("{}\n{}\n{}", START_MARKER, text, END_MARKER),
    }
}

/// Quality directives for `format`, one per line
fn quality_directives(format: OutputFormat, quality: &QualityOptions) -> Vec<String> {
    let quality = quality.for_format(format);
    let mut lines = Vec::new();
    if let Some(dpi) = quality.dpi {
        lines.push(format!("skinparam dpi {}", dpi));
    }
    if let Some(scale) = quality.scale {
        lines.push(format!("scale {}", scale));
    }
    lines
}

/// Inject quality directives right after the first `@startuml` line
///
/// Text without a start marker is normalised first.
pub fn inject_quality(text: &str, format: OutputFormat, quality: &QualityOptions) -> String {
    let directives = quality_directives(format, quality);
    let source = if text.contains(START_MARKER) {
        text.to_string()
    } else {
        normalize(text)
    };
    if directives.is_empty() {
        return source;
    }

    // START_MARKER is present after normalize
    let start = source.find(START_MARKER).unwrap_or(0);
    let line_end = source[start..]
        .find('\n')
        .map(|offset| start + offset)
        .unwrap_or(source.len());

    let mut out = String::with_capacity(source.len() + 32);
    out.push_str(&source[..line_end]);
    for line in &directives {
        out.push('\n');
        out.push_str(line);
    }
    out.push_str(&source[line_end..]);
    out
}
