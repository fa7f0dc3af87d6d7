//! Prompt context and placeholder templates
//!
//! Prompts are plain text with `{field}` placeholders. `{{` and `}}`
//! escape literal braces. Two placeholders are built in: `{entity}` is
//! the subject entity and `{data_source_status}` the provenance note.

use crate::error::TemplateError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Placeholder that always resolves to the subject entity
pub const ENTITY_PLACEHOLDER: &str = "entity";

/// Placeholder that resolves to [`DataSourceStatus::note`]
pub const DATA_STATUS_PLACEHOLDER: &str = "data_source_status";

/// True for placeholders every context can resolve
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    name == ENTITY_PLACEHOLDER || name == DATA_STATUS_PLACEHOLDER
}

/// Which fields came from the source and which fell back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceStatus {
    /// Fields resolved from source records
    pub from_source: Vec<String>,
    /// Fields that were missing and replaced by fallback text
    pub fallback: Vec<String>,
}

impl DataSourceStatus {
    /// True when at least one field fell back
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.fallback.is_empty()
    }

    /// One-line note suitable for a prompt preamble
    #[must_use]
    pub fn note(&self) -> String {
        let mut note = format!("Data from source: {}.", join_or_none(&self.from_source));
        if self.is_degraded() {
            note.push_str(&format!(" Unavailable: {}.", self.fallback.join(", ")));
        }
        note
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Values available to one prompt
///
/// Built once per rule from the rule's declared fields; nothing outside
/// `fields` and the entity name can be referenced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Subject entity of the report
    pub entity: String,
    /// Rule being generated
    pub rule_id: String,
    /// Field values in declaration order
    pub fields: IndexMap<String, String>,
    /// Source vs fallback provenance of `fields`
    pub data_status: DataSourceStatus,
}

impl PromptContext {
    /// Create a context for `entity` and `rule_id`
    #[must_use]
    pub fn new(entity: impl Into<String>, rule_id: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            rule_id: rule_id.into(),
            ..Self::default()
        }
    }

    /// Add a field resolved from the source
    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_source(name, value);
        self
    }

    /// Add a list-valued field, joined with `, `
    #[must_use]
    pub fn with_list<I, S>(mut self, name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = items
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.insert_source(name, joined);
        self
    }

    /// Add a field that fell back to placeholder text
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, name: impl Into<String>, fallback: impl Into<String>) -> Self {
        let name = name.into();
        self.data_status.fallback.push(name.clone());
        self.fields.insert(name, fallback.into());
        self
    }

    fn insert_source(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.data_status.from_source.push(name.clone());
        self.fields.insert(name, value.into());
    }

    /// Value bound to a placeholder name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            ENTITY_PLACEHOLDER => Some(Cow::Borrowed(self.entity.as_str())),
            DATA_STATUS_PLACEHOLDER => Some(Cow::Owned(self.data_status.note())),
            _ => self.fields.get(name).map(|v| Cow::Borrowed(v.as_str())),
        }
    }
}

/// One parsed piece of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                segments.push(Segment::Literal(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                segments.push(Segment::Literal(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .map(|rel| i + 1 + rel)
                    .ok_or(TemplateError::UnclosedPlaceholder { offset: i })?;
                let name = &template[i + 1..close];
                if !is_placeholder_name(name) {
                    return Err(TemplateError::InvalidPlaceholder {
                        name: name.to_string(),
                        offset: i,
                    });
                }
                segments.push(Segment::Literal(&template[literal_start..i]));
                segments.push(Segment::Placeholder(name));
                i = close + 1;
                literal_start = i;
            }
            b'}' => return Err(TemplateError::UnmatchedBrace { offset: i }),
            _ => i += 1,
        }
    }
    segments.push(Segment::Literal(&template[literal_start..]));
    Ok(segments)
}

/// Placeholder names of `template` in first-use order, without duplicates
///
/// # Errors
/// Returns error if the template is malformed
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Substitute every placeholder of `template` from `context`
///
/// # Errors
/// Returns error if the template is malformed or names an unbound field
pub fn render(template: &str, context: &PromptContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(name) => {
                let value = context
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn acme() -> PromptContext {
        PromptContext::new("Acme", "summary")
            .with_field("served", "1000")
            .with_list("regions", ["Nairobi", "Kampala"])
    }

    #[test]
    fn renders_fields_and_entity() {
        let text = render("Write about {entity}: served {served} in {regions}.", &acme()).unwrap();
        assert_eq!(text, "Write about Acme: served 1000 in Nairobi, Kampala.");
    }

    #[test]
    fn escaped_braces_are_literal() {
        let text = render("Return {{\"text\": \"{entity}\"}}", &acme()).unwrap();
        assert_eq!(text, "Return {\"text\": \"Acme\"}");
        assert!(placeholders("{{not_a_field}}").unwrap().is_empty());
    }

    #[test]
    fn placeholders_are_deduplicated_in_order() {
        let names = placeholders("{b} {a} {b} {entity}").unwrap();
        assert_eq!(names, vec!["b", "a", "entity"]);
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert_eq!(
            placeholders("Hello {name"),
            Err(TemplateError::UnclosedPlaceholder { offset: 6 })
        );
        assert_eq!(placeholders("oops }"), Err(TemplateError::UnmatchedBrace { offset: 5 }));
        assert!(matches!(
            placeholders("{two words}"),
            Err(TemplateError::InvalidPlaceholder { .. })
        ));
        assert!(matches!(placeholders("{}"), Err(TemplateError::InvalidPlaceholder { .. })));
    }

    #[test]
    fn unknown_placeholder_fails_render() {
        assert_eq!(
            render("{missing}", &acme()),
            Err(TemplateError::UnknownPlaceholder("missing".into()))
        );
    }

    #[test]
    fn data_status_note_lists_fallbacks() {
        let ctx = acme().with_fallback("risks", "[data unavailable]");
        assert!(ctx.data_status.is_degraded());
        assert_eq!(
            ctx.data_status.note(),
            "Data from source: served, regions. Unavailable: risks."
        );
        assert_eq!(ctx.get("risks").as_deref(), Some("[data unavailable]"));
        assert_eq!(
            render("{data_source_status}", &ctx).unwrap(),
            "Data from source: served, regions. Unavailable: risks."
        );
    }

    proptest! {
        #[test]
        fn prop_brace_free_text_renders_unchanged(text in "[^{}]{0,80}") {
            prop_assert_eq!(render(&text, &PromptContext::default()).unwrap(), text);
        }
    }
}
