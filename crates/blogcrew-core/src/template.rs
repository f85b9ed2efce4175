//! `{placeholder}` interpolation for agent and task templates.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::CrewError;

/// Named values substituted into templates for one kickoff.
pub type Inputs = BTreeMap<String, String>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("invalid placeholder regex")
});

/// Replace every `{name}` in `template` with `inputs[name]`.
///
/// Braces that do not wrap an identifier (JSON snippets, `{}`) are left alone.
/// A placeholder without a matching input is an error.
pub fn interpolate(template: &str, inputs: &Inputs) -> Result<String, CrewError> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .find(|name| !inputs.contains_key(name))
    {
        return Err(CrewError::MissingInput(missing));
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        inputs
            .get(&caps[1])
            .cloned()
            .unwrap_or_default()
    });

    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(topic: &str) -> Inputs {
        Inputs::from([("topic".to_string(), topic.to_string())])
    }

    #[test]
    fn substitutes_every_occurrence() {
        let rendered = interpolate("{topic} and more {topic}", &inputs("AI")).unwrap();
        assert_eq!(rendered, "AI and more AI");
    }

    #[test]
    fn templates_without_placeholders_pass_through() {
        let rendered = interpolate("static text {} {\"a\": 1}", &inputs("AI")).unwrap();
        assert_eq!(rendered, "static text {} {\"a\": 1}");
    }

    #[test]
    fn substituted_values_are_not_reinterpreted() {
        let rendered = interpolate("about {topic}", &inputs("{topic}")).unwrap();
        assert_eq!(rendered, "about {topic}");
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = interpolate("{audience} reads {topic}", &inputs("AI")).unwrap_err();
        assert!(matches!(err, CrewError::MissingInput(name) if name == "audience"));
    }
}
