//! Rules that map metric names onto entity events.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKey, EntityMap, FieldValue};
use crate::tags::Tags;
use crate::template::{Bindings, Template};

/// The schema field whose bound value becomes the name of the metric's value field.
pub const METRIC_NAME_FIELD: &str = "metricName";

/// Prefix for fields produced by rule labels and metric tags.
pub const LABEL_PREFIX: &str = "label.";

/// An error returned when a rule cannot be constructed from its configuration.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The match expression is not a valid regular expression.
    #[error("invalid match expression {expression:?}")]
    InvalidExpression {
        /// The configured expression.
        expression: String,
        /// The error reported by the regex compiler.
        #[source]
        source: regex::Error,
    },
    /// The metric schema cannot be used to split metric names.
    #[error("invalid metric schema {schema:?}: {reason}")]
    InvalidSchema {
        /// The configured schema.
        schema: String,
        /// What is wrong with the schema.
        reason: &'static str,
    },
}

/// The outcome of evaluating a single rule against a metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleMatch {
    /// The match expression did not match the metric name.
    NoMatch,
    /// The match expression matched.
    ///
    /// `emitted` is `false` if the metric name has fewer segments than the rule's schema, in
    /// which case no fields were recorded.
    Matched {
        /// Whether fields were written to an entity record.
        emitted: bool,
    },
}

impl RuleMatch {
    /// Returns `true` if the match expression matched, regardless of whether fields were emitted.
    pub fn is_match(self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal,
    Field(String),
}

/// A dot-delimited schema such as `{app}.{service}.{metricName}`.
///
/// A segment containing a `{field}` placeholder binds the whole metric name segment at the same
/// position, so `app-{app}` binds `app` to the full segment. Text around the placeholder is not
/// compared. Segments without a placeholder are positional only: they are neither bound nor
/// compared against the metric name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricSchema {
    segments: Vec<Segment>,
}

impl MetricSchema {
    /// Parses a schema string.
    pub fn parse(schema: &str) -> Result<Self, RuleError> {
        let invalid = |reason| RuleError::InvalidSchema {
            schema: schema.to_owned(),
            reason,
        };

        if schema.is_empty() {
            return Err(invalid("schema is empty"));
        }

        let segments = schema
            .split('.')
            .map(parse_segment)
            .collect::<Result<_, _>>()
            .map_err(invalid)?;

        Ok(Self { segments })
    }

    /// Returns the number of dot-delimited segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`, a schema has at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Binds the schema's fields to the segments of a metric name.
    ///
    /// Returns `None` if the name has fewer segments than the schema. A field in the last schema
    /// segment captures the remainder of the name, including its dots.
    pub fn extract(&self, name: &str) -> Option<Bindings> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() < self.segments.len() {
            return None;
        }

        let last = self.segments.len() - 1;
        let mut bindings = Bindings::new();

        for (index, segment) in self.segments.iter().enumerate() {
            if let Segment::Field(field) = segment {
                let value = if index == last {
                    parts[index..].join(".")
                } else {
                    parts[index].to_owned()
                };
                bindings.insert(field.clone(), value);
            }
        }

        Some(bindings)
    }
}

fn parse_segment(segment: &str) -> Result<Segment, &'static str> {
    let Some(open) = segment.find('{') else {
        if segment.contains('}') {
            return Err("unmatched closing brace");
        }
        return Ok(Segment::Literal);
    };

    if segment[..open].contains('}') {
        return Err("unmatched closing brace");
    }

    let after = &segment[open + 1..];
    let Some(close) = after.find('}') else {
        return Err("unclosed placeholder");
    };

    let name = &after[..close];
    if name.is_empty() {
        return Err("placeholder without a field name");
    }
    if name.contains('{') {
        return Err("placeholder contains braces");
    }
    if after[close + 1..].contains(['{', '}']) {
        return Err("segment contains more than one placeholder");
    }

    Ok(Segment::Field(name.to_owned()))
}

/// Configuration of a single rule, as written in the config file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Regular expression searched for in the metric name.
    pub match_expression: String,
    /// Dot-delimited schema with `{field}` placeholders.
    pub metric_schema: String,
    /// Template for the entity type.
    pub entity_type: String,
    /// Template for the entity name.
    pub entity_name: String,
    /// Event type of the records this rule produces.
    pub event_type: String,
    /// Additional fields written as `label.<name>`, rendered from templates.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
}

/// A compiled rule.
///
/// Rules deserialize from [`RuleConfig`] and validate their expression and schema while doing so.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(try_from = "RuleConfig", into = "RuleConfig")]
pub struct Rule {
    config: RuleConfig,
    expression: Regex,
    schema: MetricSchema,
    entity_type: Template,
    entity_name: Template,
    labels: IndexMap<String, Template>,
}

impl Rule {
    /// Compiles a rule from its configuration.
    pub fn new(config: RuleConfig) -> Result<Self, RuleError> {
        let expression =
            Regex::new(&config.match_expression).map_err(|source| RuleError::InvalidExpression {
                expression: config.match_expression.clone(),
                source,
            })?;

        let schema = MetricSchema::parse(&config.metric_schema)?;

        let labels = config
            .labels
            .iter()
            .map(|(name, template)| (name.clone(), Template::new(template.as_str())))
            .collect();

        Ok(Self {
            expression,
            schema,
            entity_type: Template::new(config.entity_type.as_str()),
            entity_name: Template::new(config.entity_name.as_str()),
            labels,
            config,
        })
    }

    /// Returns the configuration this rule was built from.
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Returns the event type of records produced by this rule.
    pub fn event_type(&self) -> &str {
        &self.config.event_type
    }

    /// Returns the schema used to split metric names.
    pub fn schema(&self) -> &MetricSchema {
        &self.schema
    }

    /// Evaluates the rule for one metric and merges the extracted fields into `entities`.
    ///
    /// On a valid match, the fields bound by the schema are written to the record of the rendered
    /// entity under this rule's event type. The `metricName` field is not written itself: its
    /// bound value becomes the name of the field holding `value`. Rule labels follow, then the
    /// metric's tags, both prefixed with `label.`. Existing fields are overwritten.
    pub fn evaluate(
        &self,
        name: &str,
        value: f64,
        tags: &Tags,
        entities: &mut EntityMap,
    ) -> RuleMatch {
        if !self.expression.is_match(name) {
            return RuleMatch::NoMatch;
        }

        let Some(bindings) = self.schema.extract(name) else {
            return RuleMatch::Matched { emitted: false };
        };

        let entity = Entity {
            name: self.entity_name.render(&bindings),
            ty: self.entity_type.render(&bindings),
        };
        let key = EntityKey::new(&entity.ty, &entity.name, tags);
        let fields = entities
            .record_mut(key, entity)
            .fields_mut(&self.config.event_type);

        for (field, bound) in &bindings {
            if field == METRIC_NAME_FIELD {
                fields.insert(bound.clone(), FieldValue::Number(value));
            } else {
                fields.insert(field.clone(), FieldValue::Text(bound.clone()));
            }
        }

        for (label, template) in &self.labels {
            fields.insert(
                format!("{LABEL_PREFIX}{label}"),
                FieldValue::Text(template.render(&bindings)),
            );
        }

        for (tag, tag_value) in tags {
            fields.insert(
                format!("{LABEL_PREFIX}{tag}"),
                FieldValue::Text(tag_value.clone()),
            );
        }

        RuleMatch::Matched { emitted: true }
    }
}

impl TryFrom<RuleConfig> for Rule {
    type Error = RuleError;

    fn try_from(config: RuleConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

impl From<Rule> for RuleConfig {
    fn from(rule: Rule) -> Self {
        rule.config
    }
}
