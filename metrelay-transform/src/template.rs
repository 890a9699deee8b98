use std::borrow::Cow;
use std::fmt;

use dynfmt::{Argument, Format, FormatArgs, SimpleCurlyFormat};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Rendered in place of a placeholder whose field was not extracted from the metric name.
pub const UNRESOLVED_FIELD: &str = "undefined";

/// Field bindings extracted from a metric name, keyed by placeholder name.
pub type Bindings = IndexMap<String, String>;

struct BoundFields<'a>(&'a Bindings);

impl FormatArgs for BoundFields<'_> {
    fn get_key(&self, key: &str) -> Result<Option<Argument<'_>>, ()> {
        Ok(Some(match self.0.get(key) {
            Some(value) => value as Argument<'_>,
            None => &UNRESOLVED_FIELD as Argument<'_>,
        }))
    }
}

/// A string with `{field}` placeholders.
///
/// Field names consist of word characters. A template that cannot be formatted, for instance
/// because it contains a positional `{}`, renders as its literal text.
///
/// ```
/// use metrelay_transform::{Bindings, Template};
///
/// let template = Template::new("{app} on {host}");
/// let mut bindings = Bindings::new();
/// bindings.insert("app".to_owned(), "myapp".to_owned());
///
/// assert_eq!(template.render(&bindings), "myapp on undefined");
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub struct Template {
    raw: String,
}

impl Template {
    /// Creates a template from its configured string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Returns the template string as it was configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitutes every placeholder with its bound value.
    ///
    /// Placeholders without a binding render as [`UNRESOLVED_FIELD`].
    pub fn render(&self, bindings: &Bindings) -> String {
        SimpleCurlyFormat
            .format(&self.raw, BoundFields(bindings))
            .unwrap_or(Cow::Borrowed(self.raw.as_str()))
            .into_owned()
    }
}

impl From<String> for Template {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.raw
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({:?})", self.raw)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_literal_only() {
        let template = Template::new("Redis Cluster");
        assert_eq!(template.render(&Bindings::new()), "Redis Cluster");
    }

    #[test]
    fn test_substitution() {
        let template = Template::new("{app}-{service}:{app}");
        let rendered = template.render(&bindings(&[("app", "shop"), ("service", "redis")]));
        assert_eq!(rendered, "shop-redis:shop");
    }

    #[test]
    fn test_unresolved_renders_undefined() {
        let template = Template::new("host {host}");
        assert_eq!(template.render(&Bindings::new()), "host undefined");
    }

    #[test]
    fn test_unformattable_renders_literal() {
        let template = Template::new("a{b {} c} {d");
        assert_eq!(template.render(&Bindings::new()), "a{b {} c} {d");
    }

    #[test]
    fn test_unclosed_brace_is_literal() {
        let template = Template::new("{app} {host");
        assert_eq!(template.render(&bindings(&[("app", "shop")])), "shop {host");
    }

    #[test]
    fn test_serde_as_string() {
        let template: Template = serde_json::from_str(r#""{app} cluster""#).unwrap();
        assert_eq!(template.as_str(), "{app} cluster");
        assert_eq!(
            serde_json::to_string(&template).unwrap(),
            r#""{app} cluster""#
        );
    }
}
