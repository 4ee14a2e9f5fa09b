use std::collections::HashMap;

use edge_config::{RewritePhase, RewriteSpec};
use url::Url;

use crate::pattern::{is_param_name, PathPattern};
use crate::RewriteError;

#[derive(Clone, Debug, Eq, PartialEq)]
enum TemplatePart {
    Literal(String),
    Param(String),
}

/// Absolute `http(s)` URL with `:name` placeholders, e.g.
/// `http://172.17.0.2:5000/:path*`. A colon followed by a digit is a port.
#[derive(Clone, Debug)]
pub struct DestinationTemplate {
    raw: String,
    parts: Vec<TemplatePart>,
}

impl DestinationTemplate {
    pub fn parse(destination: &str) -> Result<Self, RewriteError> {
        let invalid = |reason: &str| RewriteError::InvalidDestination {
            destination: destination.to_string(),
            reason: reason.to_string(),
        };
        let scheme_len = ["http://", "https://"]
            .iter()
            .find(|scheme| {
                destination
                    .get(..scheme.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
            })
            .map(|scheme| scheme.len())
            .ok_or_else(|| invalid("must be an absolute http:// or https:// URL"))?;

        let mut parts = Vec::new();
        let mut literal = destination[..scheme_len].to_string();
        let rest = &destination[scheme_len..];
        let mut chars = rest.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c != ':' {
                literal.push(c);
                continue;
            }
            let name_len = rest[idx + 1..]
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len() - idx - 1);
            let name = &rest[idx + 1..idx + 1 + name_len];
            if !is_param_name(name) {
                literal.push(c);
                continue;
            }
            for _ in 0..name_len {
                chars.next();
            }
            if let Some(&(_, modifier)) = chars.peek() {
                let after = chars.clone().nth(1).map(|(_, ch)| ch);
                let is_modifier = matches!(modifier, '*' | '+')
                    || (modifier == '?' && matches!(after, None | Some('/')));
                if is_modifier {
                    chars.next();
                }
            }
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(TemplatePart::Param(name.to_string()));
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        let template = Self {
            raw: destination.to_string(),
            parts,
        };
        let probe: HashMap<String, String> = template
            .param_names()
            .into_iter()
            .map(|name| (name.to_string(), "x".to_string()))
            .collect();
        let url = Url::parse(&template.render(&probe)).map_err(|err| invalid(&err.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                TemplatePart::Param(name) => Some(name.as_str()),
                TemplatePart::Literal(_) => None,
            })
            .collect()
    }

    /// Substitutes captured values verbatim. An empty capture followed by a
    /// literal starting with `/` does not produce a doubled slash.
    pub fn render(&self, params: &HashMap<String, String>) -> String {
        let mut out = String::new();
        let mut collapse_slash = false;
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => {
                    let text = if collapse_slash && out.ends_with('/') {
                        text.strip_prefix('/').unwrap_or(text)
                    } else {
                        text.as_str()
                    };
                    out.push_str(text);
                    collapse_slash = false;
                }
                TemplatePart::Param(name) => {
                    let value = params.get(name).map(String::as_str).unwrap_or("");
                    out.push_str(value);
                    collapse_slash = value.is_empty();
                }
            }
        }
        out
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewriteTarget {
    pub url: String,
    pub rule_source: String,
    pub phase: RewritePhase,
}

#[derive(Clone, Debug)]
pub struct RewriteRule {
    source: PathPattern,
    destination: DestinationTemplate,
    phase: RewritePhase,
}

impl RewriteRule {
    pub fn compile(
        source: &str,
        destination: &str,
        phase: RewritePhase,
    ) -> Result<Self, RewriteError> {
        let source = PathPattern::parse(source)?;
        let destination = DestinationTemplate::parse(destination)?;

        let used = destination.param_names();
        for name in &used {
            if !source.param_names().contains(name) {
                return Err(RewriteError::UnknownParam {
                    param: name.to_string(),
                    rule: source.as_str().to_string(),
                });
            }
        }
        for name in source.param_names() {
            match used.iter().filter(|used| **used == name).count() {
                0 => {
                    return Err(RewriteError::UnusedParam {
                        param: name.to_string(),
                        rule: source.as_str().to_string(),
                    })
                }
                1 => {}
                _ => {
                    return Err(RewriteError::DuplicateParam {
                        param: name.to_string(),
                        rule: source.as_str().to_string(),
                    })
                }
            }
        }

        Ok(Self {
            source,
            destination,
            phase,
        })
    }

    pub fn from_spec(spec: &RewriteSpec) -> Result<Self, RewriteError> {
        Self::compile(&spec.source, &spec.destination, spec.phase)
    }

    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    pub fn destination(&self) -> &str {
        self.destination.as_str()
    }

    pub fn phase(&self) -> RewritePhase {
        self.phase
    }

    pub fn matches(&self, path: &str) -> bool {
        self.source.is_match(path)
    }

    pub fn apply(&self, path: &str, query: Option<&str>) -> Option<RewriteTarget> {
        let params = self.source.captures(path)?;
        let rendered = self.destination.render(&params);
        Some(RewriteTarget {
            url: merge_query(&rendered, query),
            rule_source: self.source.as_str().to_string(),
            phase: self.phase,
        })
    }
}

/// Ordered rules. Within a phase the first matching rule wins.
#[derive(Clone, Debug, Default)]
pub struct RewriteTable {
    rules: Vec<RewriteRule>,
}

impl RewriteTable {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    pub fn from_specs(specs: &[RewriteSpec]) -> Result<Self, RewriteError> {
        let rules = specs
            .iter()
            .map(RewriteRule::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn resolve(
        &self,
        phase: RewritePhase,
        path: &str,
        query: Option<&str>,
    ) -> Option<RewriteTarget> {
        self.rules
            .iter()
            .filter(|rule| rule.phase == phase)
            .find_map(|rule| rule.apply(path, query))
    }

    /// Tries every phase in routing order.
    pub fn resolve_any(&self, path: &str, query: Option<&str>) -> Option<RewriteTarget> {
        RewritePhase::ALL
            .iter()
            .find_map(|phase| self.resolve(*phase, path, query))
    }
}

/// Without a destination query the request query is appended exactly as it
/// arrived. Otherwise destination pairs come first and request pairs follow
/// unless the destination already sets the same key; pairs are not decoded.
fn merge_query(url: &str, query: Option<&str>) -> String {
    let query = match query {
        Some(query) if !query.is_empty() => query,
        _ => return url.to_string(),
    };
    let Some((base, dest_query)) = url.split_once('?') else {
        return format!("{url}?{query}");
    };

    let mut pairs: Vec<&str> = dest_query.split('&').filter(|pair| !pair.is_empty()).collect();
    let dest_keys: Vec<&str> = pairs.iter().map(|pair| pair_key(pair)).collect();
    pairs.extend(
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| !dest_keys.contains(&pair_key(pair))),
    );
    if pairs.is_empty() {
        return base.to_string();
    }
    format!("{base}?{}", pairs.join("&"))
}

fn pair_key(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(key, _)| key)
}
