//! Review prompt templates.
//!
//! A review task names a template (`security`, `tests`, ...) instead of
//! carrying a prompt. The built-in set can be extended or overridden from a
//! YAML file:
//!
//! ```yaml
//! templates:
//!   security: |
//!     Audit {target} for injection flaws only.
//!     {custom_prompt}
//!   docs: |
//!     Check that public items in {target} are documented.
//!     {custom_prompt}
//! # Drop the built-ins and expose only the templates above.
//! replace_defaults: false
//! ```
//!
//! Templates may use `{target}` and `{custom_prompt}`.

use super::template::Template;
use crate::agent::task::ReviewRequest;
use crate::error::ConfigurationError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const TARGET_VAR: &str = "target";
pub const CUSTOM_PROMPT_VAR: &str = "custom_prompt";
const PLACEHOLDERS: &[&str] = &[TARGET_VAR, CUSTOM_PROMPT_VAR];

/// Target used when a review request names none.
pub const DEFAULT_TARGET: &str = "the uncommitted changes in the current working directory";

const BUILTIN: &[(&str, &str)] = &[
    (
        "general",
        "Review {target}. Look for bugs, unclear logic, missing error handling \
and anything a careful reviewer would flag. Report findings ordered by \
severity with file and line references. Do not modify any files.\n\n{custom_prompt}",
    ),
    (
        "security",
        "Perform a security review of {target}. Look for injection, unsafe \
deserialization, secrets in code, path traversal, missing authorization checks \
and unsafe handling of untrusted input. For each finding give the location, \
the impact and a suggested fix. Do not modify any files.\n\n{custom_prompt}",
    ),
    (
        "performance",
        "Review {target} for performance problems: needless allocation or \
copying, quadratic loops, blocking calls on hot paths, unbounded growth and \
missing caching. Estimate the impact of each finding. Do not modify any \
files.\n\n{custom_prompt}",
    ),
    (
        "tests",
        "Review the test coverage of {target}. Identify untested behavior, \
missing edge cases and brittle tests, and propose concrete test cases. Do not \
modify any files.\n\n{custom_prompt}",
    ),
    (
        "style",
        "Review {target} for readability and consistency with the surrounding \
code: naming, structure, dead code and comments that no longer match the code. \
Do not modify any files.\n\n{custom_prompt}",
    ),
];

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplatesFile {
    #[serde(default)]
    templates: BTreeMap<String, String>,
    #[serde(default)]
    replace_defaults: bool,
}

/// Named review templates, validated at load.
#[derive(Debug, Clone)]
pub struct ReviewTemplates {
    templates: BTreeMap<String, Template>,
}

impl Default for ReviewTemplates {
    fn default() -> Self {
        let templates = BUILTIN
            .iter()
            .filter_map(|(name, source)| {
                Template::parse(source)
                    .ok()
                    .map(|template| (name.to_string(), template))
            })
            .collect();
        Self { templates }
    }
}

impl ReviewTemplates {
    /// Load templates from a YAML file layered over the built-ins.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::Other(format!(
                "failed to read review templates '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        let file: TemplatesFile = if yaml.trim().is_empty() {
            TemplatesFile::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| {
                ConfigurationError::Other(format!("failed to parse review templates: {}", e))
            })?
        };

        let mut loaded = if file.replace_defaults {
            Self {
                templates: BTreeMap::new(),
            }
        } else {
            Self::default()
        };

        for (name, source) in file.templates {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigurationError::InvalidTemplate {
                    name,
                    reason: "template name cannot be empty".to_string(),
                });
            }
            let template = Template::parse_restricted(&source, PLACEHOLDERS).map_err(|e| {
                ConfigurationError::InvalidTemplate {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            if template.source().trim().is_empty() {
                return Err(ConfigurationError::InvalidTemplate {
                    name,
                    reason: "template body cannot be empty".to_string(),
                });
            }
            loaded.templates.insert(name, template);
        }

        if loaded.templates.is_empty() {
            return Err(ConfigurationError::Other(
                "review templates file defines no templates".to_string(),
            ));
        }
        Ok(loaded)
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Render the prompt for a review request.
    pub fn render(&self, request: &ReviewRequest) -> Result<String, ConfigurationError> {
        let name = request.review_type.trim();
        let template =
            self.templates
                .get(name)
                .ok_or_else(|| ConfigurationError::UnknownReviewType {
                    name: name.to_string(),
                    available: self.names(),
                })?;

        let target = non_blank(request.target.as_deref()).unwrap_or(DEFAULT_TARGET);
        let custom = non_blank(request.custom_prompt.as_deref()).unwrap_or_default();
        let values = HashMap::from([(TARGET_VAR, target), (CUSTOM_PROMPT_VAR, custom)]);

        let rendered = template
            .render(&values)
            .map_err(|e| ConfigurationError::InvalidTemplate {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(rendered.trim().to_string())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(review_type: &str) -> ReviewRequest {
        ReviewRequest {
            review_type: review_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_builtins_all_parse() {
        let templates = ReviewTemplates::default();
        assert_eq!(templates.names().len(), BUILTIN.len());
        for name in ["general", "security", "performance", "tests", "style"] {
            assert!(templates.contains(name), "{name}");
        }
    }

    #[test]
    fn test_render_fills_target_and_custom_prompt() {
        let templates = ReviewTemplates::default();
        let prompt = templates
            .render(&ReviewRequest {
                review_type: "security".to_string(),
                target: Some("src/auth.rs".to_string()),
                custom_prompt: Some("Focus on token handling.".to_string()),
            })
            .unwrap();
        assert!(prompt.contains("src/auth.rs"));
        assert!(prompt.ends_with("Focus on token handling."));
    }

    #[test]
    fn test_render_defaults_target() {
        let prompt = ReviewTemplates::default().render(&request("general")).unwrap();
        assert!(prompt.contains(DEFAULT_TARGET));
        assert!(!prompt.contains("{custom_prompt}"));
    }

    #[test]
    fn test_unknown_review_type_lists_available() {
        let err = ReviewTemplates::default()
            .render(&request("vibes"))
            .unwrap_err();
        match err {
            ConfigurationError::UnknownReviewType { name, available } => {
                assert_eq!(name, "vibes");
                assert!(available.contains(&"security".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_yaml_extends_and_overrides_builtins() {
        let yaml = r#"
templates:
  security: "Only check {target} for SQL injection."
  docs: "Check docs in {target}. {custom_prompt}"
"#;
        let templates = ReviewTemplates::from_yaml(yaml).unwrap();
        assert!(templates.contains("general"));
        assert!(templates.contains("docs"));
        assert_eq!(
            templates.render(&request("security")).unwrap(),
            format!("Only check {DEFAULT_TARGET} for SQL injection.")
        );
    }

    #[test]
    fn test_yaml_replace_defaults() {
        let yaml = "replace_defaults: true\ntemplates:\n  only: \"Review {target}\"\n";
        let templates = ReviewTemplates::from_yaml(yaml).unwrap();
        assert_eq!(templates.names(), vec!["only".to_string()]);
    }

    #[test]
    fn test_yaml_rejects_unknown_placeholder() {
        let yaml = "templates:\n  bad: \"Review {branch}\"\n";
        let err = ReviewTemplates::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidTemplate { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_yaml_rejects_empty_result() {
        let yaml = "replace_defaults: true\n";
        assert!(ReviewTemplates::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_yaml_rejects_unknown_keys() {
        assert!(ReviewTemplates::from_yaml("tempaltes: {}\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let err = ReviewTemplates::load(temp_dir.path().join("reviews.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read review templates"));
    }
}
