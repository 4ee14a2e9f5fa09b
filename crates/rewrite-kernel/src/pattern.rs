use std::collections::HashMap;

use regex::Regex;

use crate::RewriteError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Repeat {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Repeat {
    fn from_modifier(modifier: Option<char>) -> Self {
        match modifier {
            Some('?') => Repeat::Optional,
            Some('*') => Repeat::ZeroOrMore,
            Some('+') => Repeat::OneOrMore,
            _ => Repeat::One,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    Literal(String),
    Param { name: String, repeat: Repeat },
}

/// A compiled `source` pattern such as `/api/:path*`.
///
/// Literal segments compare ASCII-case-insensitively, a single trailing slash on
/// the request path is ignored, and captures are returned exactly as they
/// appear in the path.
#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl PathPattern {
    pub fn parse(source: &str) -> Result<Self, RewriteError> {
        let invalid = |reason: &str| RewriteError::InvalidSource {
            pattern: source.to_string(),
            reason: reason.to_string(),
        };
        let rest = source
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;
        if source.contains(['(', ')', '#']) {
            return Err(invalid("custom groups and fragments are not supported"));
        }

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for raw in rest.split('/') {
                if raw.is_empty() {
                    return Err(invalid("empty path segment"));
                }
                segments.push(parse_segment(raw).map_err(|reason| invalid(&reason))?);
            }
        }

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param { name, .. } = segment {
                if seen.contains(&name.as_str()) {
                    return Err(invalid(&format!("parameter :{name} declared twice")));
                }
                seen.push(name.as_str());
            }
        }

        let regex = Regex::new(&build_regex(&segments))
            .map_err(|err| invalid(&err.to_string()))?;

        Ok(Self {
            raw: source.to_string(),
            segments,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param { name, .. } => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Returns the captured parameters when `path` matches. Parameters that
    /// captured nothing map to an empty string.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let params = self
            .param_names()
            .into_iter()
            .map(|name| {
                let value = caps.name(name).map(|m| m.as_str()).unwrap_or("");
                (name.to_string(), value.to_string())
            })
            .collect();
        Some(params)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    let Some(param) = raw.strip_prefix(':') else {
        if raw.contains(':') {
            return Err(format!("segment '{raw}' mixes literal text with a parameter"));
        }
        if raw.contains(['?', '*', '+']) {
            return Err(format!("segment '{raw}' uses a modifier without a parameter"));
        }
        return Ok(Segment::Literal(raw.to_string()));
    };
    let (name, modifier) = match param.chars().last() {
        Some(c @ ('?' | '*' | '+')) => (&param[..param.len() - 1], Some(c)),
        _ => (param, None),
    };
    if !is_param_name(name) {
        return Err(format!("segment '{raw}' is not a valid parameter"));
    }
    Ok(Segment::Param {
        name: name.to_string(),
        repeat: Repeat::from_modifier(modifier),
    })
}

pub(crate) fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn build_regex(segments: &[Segment]) -> String {
    const ONE: &str = "[^/]+?";
    let mut out = String::from("^");
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                out.push('/');
                push_literal(&mut out, text);
            }
            Segment::Param { name, repeat } => match repeat {
                Repeat::One => out.push_str(&format!("/(?P<{name}>{ONE})")),
                Repeat::Optional => out.push_str(&format!("(?:/(?P<{name}>{ONE}))?")),
                Repeat::ZeroOrMore => {
                    out.push_str(&format!("(?:/(?P<{name}>{ONE}(?:/{ONE})*))?"))
                }
                Repeat::OneOrMore => out.push_str(&format!("/(?P<{name}>{ONE}(?:/{ONE})*)")),
            },
        }
    }
    out.push_str("/?$");
    out
}

/// Only ASCII letters fold; `(?i)` would also fold characters such as the
/// Kelvin sign onto `k`.
fn push_literal(out: &mut String, text: &str) {
    let mut buf = [0u8; 4];
    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            out.push('[');
            out.push(c.to_ascii_lowercase());
            out.push(c.to_ascii_uppercase());
            out.push(']');
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }
}
