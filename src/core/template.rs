//! `{placeholder}` templates used in recipe commands.
//!
//! Recipe strings reference values with `{name}`; a literal brace is written
//! `{{` or `}}`. Expansion happens in two passes: the resolver substitutes
//! everything known at resolution time and defers plan-time placeholders
//! (`{prefix}`, `{srcdir}`), producing a string that is still a valid
//! template. The planner then renders that string into its final form.

use std::collections::BTreeMap;

use thiserror::Error;

/// Placeholders bound when the build plan is laid out.
pub const PLAN_PLACEHOLDERS: &[&str] = &["prefix", "srcdir"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed `{{` in `{0}`")]
    Unclosed(String),

    #[error("unmatched `}}` in `{0}` (write `}}}}` for a literal brace)")]
    Unmatched(String),

    #[error("invalid placeholder name `{name}` in `{template}`")]
    InvalidName { template: String, name: String },

    #[error("unknown placeholder `{{{name}}}` in `{template}`")]
    Unknown { template: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(String),
    Placeholder(&'a str),
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        literal.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with("{{") {
            literal.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            literal.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(TemplateError::Unmatched(template.to_string()));
        } else {
            let close = tail
                .find('}')
                .ok_or_else(|| TemplateError::Unclosed(template.to_string()))?;
            let name = &tail[1..close];
            if !is_valid_name(name) {
                return Err(TemplateError::InvalidName {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(name));
            rest = &tail[close + 1..];
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Escape literal text so it survives another expansion pass.
pub fn escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Names of all placeholders in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Result<Vec<&str>, TemplateError> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Check that every placeholder in `template` is one of `allowed`.
pub fn check(template: &str, allowed: &[&str]) -> Result<(), TemplateError> {
    for name in placeholders(template)? {
        if !allowed.contains(&name) {
            return Err(TemplateError::Unknown {
                template: template.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Substitute resolution-time values, keeping the result a template.
///
/// `fragments` map placeholder names to strings that are already in template
/// form (use [`escape`] for plain values). Placeholders listed in `deferred`
/// are kept as-is for a later pass.
pub fn substitute(
    template: &str,
    fragments: &BTreeMap<String, String>,
    deferred: &[&str],
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&escape(&text)),
            Segment::Placeholder(name) => {
                if let Some(fragment) = fragments.get(name) {
                    out.push_str(fragment);
                } else if deferred.contains(&name) {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                } else {
                    return Err(TemplateError::Unknown {
                        template: template.to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Render a template into its final text.
pub fn render(template: &str, values: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Placeholder(name) => match values.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(TemplateError::Unknown {
                        template: template.to_string(),
                        name: name.to_string(),
                    })
                }
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("--with-python-module-path={prefix}/lib/python{python_version}").unwrap(),
            vec!["prefix", "python_version"]
        );
        assert!(placeholders("plain").unwrap().is_empty());
    }

    #[test]
    fn test_escapes() {
        let values = map(&[]);
        assert_eq!(render("a {{b}} c", &values).unwrap(), "a {b} c");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(placeholders("{prefix"), Err(TemplateError::Unclosed(_))));
        assert!(matches!(placeholders("x}"), Err(TemplateError::Unmatched(_))));
        assert!(matches!(
            placeholders("{not valid}"),
            Err(TemplateError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_check_unknown() {
        assert!(check("--prefix={prefix}", &["prefix"]).is_ok());
        let err = check("{pyhton}", &["python"]).unwrap_err();
        assert!(err.to_string().contains("{pyhton}"));
    }

    #[test]
    fn test_two_pass_expansion() {
        let fragments = map(&[("python", "python3"), ("odd", "{{x}}")]);
        let partial =
            substitute("PYTHON={python} --prefix={prefix} {odd} {{lit}}", &fragments, PLAN_PLACEHOLDERS)
                .unwrap();
        assert_eq!(partial, "PYTHON=python3 --prefix={prefix} {{x}} {{lit}}");

        let rendered = render(&partial, &map(&[("prefix", "/opt/gt")])).unwrap();
        assert_eq!(rendered, "PYTHON=python3 --prefix=/opt/gt {x} {lit}");
    }

    #[test]
    fn test_substitute_rejects_unknown() {
        let err = substitute("{variant}", &map(&[]), PLAN_PLACEHOLDERS).unwrap_err();
        assert!(matches!(err, TemplateError::Unknown { .. }));
    }
}
