use serde_json::Value;

use crate::error::PipelineError;

/// The JSON shape a completion is expected to carry: a full batch is an
/// array of records, a single regenerated record is one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    Array,
    Object,
}

impl ExpectedShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn open(self) -> char {
        match self {
            Self::Array => '[',
            Self::Object => '{',
        }
    }

    fn close(self) -> char {
        match self {
            Self::Array => ']',
            Self::Object => '}',
        }
    }
}

/// Recover the JSON payload from raw completion text.
///
/// Models wrap their output in markdown fences, smart punctuation, and
/// stray prose; this strips the noise, slices the substring between the
/// first opening and last closing bracket for the expected shape, and
/// parses it. There is no default on failure: the caller decides whether
/// to retry generation.
///
/// # Errors
/// Returns [`PipelineError::ParseFailure`] carrying the original raw text
/// and the parser's message when no bracket pair exists or the slice does
/// not parse.
pub fn extract_payload(raw: &str, shape: ExpectedShape) -> Result<Value, PipelineError> {
    let scrubbed = scrub(raw);

    let start = scrubbed.find(shape.open());
    let end = scrubbed.rfind(shape.close());
    let (Some(start), Some(end)) = (start, end) else {
        return Err(parse_failure(
            raw,
            format!("no {}..{} pair found in completion output", shape.open(), shape.close()),
        ));
    };
    if end < start {
        return Err(parse_failure(
            raw,
            format!("closing {} appears before opening {}", shape.close(), shape.open()),
        ));
    }

    // Both brackets are ASCII, so byte-inclusive slicing is safe here.
    let candidate = &scrubbed[start..=end];
    let value: Value =
        serde_json::from_str(candidate).map_err(|err| parse_failure(raw, err.to_string()))?;

    let shape_matches = match shape {
        ExpectedShape::Array => value.is_array(),
        ExpectedShape::Object => value.is_object(),
    };
    if !shape_matches {
        return Err(parse_failure(
            raw,
            format!("parsed payload is not a JSON {}", shape.as_str()),
        ));
    }

    Ok(value)
}

/// Drop fence lines, flatten newlines to spaces, and fold typographic
/// punctuation to the ASCII the JSON parser expects.
fn scrub(raw: &str) -> String {
    let mut flat = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        flat.push_str(line);
        flat.push(' ');
    }

    let mut out = String::with_capacity(flat.len());
    for ch in flat.chars() {
        match ch {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => out.push('"'),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2022}' | '\u{00B7}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2192}' | '\u{21D2}' => out.push_str("->"),
            '\u{00A0}' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn parse_failure(raw: &str, reason: String) -> PipelineError {
    PipelineError::ParseFailure { raw: raw.to_string(), reason }
}
