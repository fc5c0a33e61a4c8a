//! `{variable}` templates for review prompts.
//!
//! # Syntax
//!
//! - `{name}` - Substitutes the value of variable `name`
//! - `{{` / `}}` - Literal `{` / `}`
//!
//! Templates are parsed once, when they are loaded, so syntax errors and
//! unknown placeholders surface at startup rather than on the first request.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unmatched '{{' at position {position}")]
    UnmatchedBrace { position: usize },

    #[error("empty placeholder '{{}}' at position {position}")]
    EmptyPlaceholder { position: usize },

    #[error("unknown placeholder '{{{name}}}'; allowed: {}", .allowed.join(", "))]
    UnknownPlaceholder { name: String, allowed: Vec<String> },

    #[error("no value supplied for '{{{0}}}'")]
    MissingValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Var(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if chars.next_if(|&(_, c)| c == '{').is_some() => text.push('{'),
                '}' if chars.next_if(|&(_, c)| c == '}').is_some() => text.push('}'),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::UnmatchedBrace { position: pos });
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder { position: pos });
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Var(name.to_string()));
                }
                _ => text.push(ch),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Parse and reject placeholders outside `allowed`.
    pub fn parse_restricted(source: &str, allowed: &[&str]) -> Result<Self, TemplateError> {
        let template = Self::parse(source)?;
        if let Some(name) = template.placeholders().find(|n| !allowed.contains(n)) {
            return Err(TemplateError::UnknownPlaceholder {
                name: name.to_string(),
                allowed: allowed.iter().map(|a| a.to_string()).collect(),
            });
        }
        Ok(template)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, values: &HashMap<&str, &str>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(name) => match values.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None => return Err(TemplateError::MissingValue(name.clone())),
                },
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_substitution_and_escapes() {
        let template = Template::parse("Review {target}. {{literal}} }} {custom_prompt}").unwrap();
        let out = template
            .render(&values(&[("target", "src/"), ("custom_prompt", "Be brief.")]))
            .unwrap();
        assert_eq!(out, "Review src/. {literal} } Be brief.");
    }

    #[test]
    fn test_placeholder_whitespace_trimmed() {
        let template = Template::parse("{ target }").unwrap();
        assert_eq!(template.placeholders().collect::<Vec<_>>(), vec!["target"]);
    }

    #[test]
    fn test_lone_closing_brace_is_text() {
        let template = Template::parse("a } b").unwrap();
        assert_eq!(template.render(&HashMap::new()).unwrap(), "a } b");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let template = Template::parse("{x}").unwrap();
        let out = template.render(&values(&[("x", "{target}")])).unwrap();
        assert_eq!(out, "{target}");
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(
            Template::parse("Hello {name").unwrap_err(),
            TemplateError::UnmatchedBrace { position: 6 }
        );
        assert_eq!(
            Template::parse("Hello {}").unwrap_err(),
            TemplateError::EmptyPlaceholder { position: 6 }
        );
    }

    #[test]
    fn test_restricted_rejects_unknown_placeholder() {
        let err = Template::parse_restricted("{target} {branch}", &["target"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown placeholder '{branch}'; allowed: target"
        );
    }

    #[test]
    fn test_missing_value() {
        let template = Template::parse("{target}").unwrap();
        assert_eq!(
            template.render(&HashMap::new()).unwrap_err(),
            TemplateError::MissingValue("target".to_string())
        );
    }
}
