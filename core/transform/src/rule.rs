//! Transform rule model.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use vaultdump_common::Locator;

use crate::template::Template;

fn default_separator() -> String {
    "_".to_string()
}

/// One transform directive.
///
/// Serialized with an `op` tag, e.g.
/// `{"op": "rename", "from": "db.user", "to": "database.username"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformRule {
    /// Remove the value or subtree at `path`. Missing paths are a no-op.
    Delete { path: Locator },

    /// Move the value or subtree at `from` to `to`, overwriting `to`.
    /// Missing sources are a no-op.
    #[serde(alias = "move")]
    Rename { from: Locator, to: Locator },

    /// Like `rename`, but the source stays in place.
    Copy { from: Locator, to: Locator },

    /// Insert or overwrite a literal value.
    Set { path: Locator, value: Value },

    /// Write the rendered template to `path`.
    #[serde(alias = "template_substitute", alias = "template-substitute")]
    Template { path: Locator, template: Template },

    /// Collapse the mapping at `path` into a single level.
    Flatten {
        path: Locator,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

impl TransformRule {
    /// Short operation name, as used in the `op` tag.
    pub fn op(&self) -> &'static str {
        match self {
            TransformRule::Delete { .. } => "delete",
            TransformRule::Rename { .. } => "rename",
            TransformRule::Copy { .. } => "copy",
            TransformRule::Set { .. } => "set",
            TransformRule::Template { .. } => "template",
            TransformRule::Flatten { .. } => "flatten",
        }
    }
}

/// The wrapped document shape, `{"rules": [...]}`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WrappedRuleSet {
    rules: Vec<TransformRule>,
}

/// An ordered sequence of rules.
///
/// Deserializes from `{"rules": [...]}` or from a bare array of rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleSet {
    rules: Vec<TransformRule>,
}

impl RuleSet {
    /// Create a rule set from rules in application order.
    pub fn new(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    /// The rules in application order.
    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Pick the shape up front so a bad rule reports its own error.
        let value = Value::deserialize(deserializer)?;
        let rules = if value.is_array() {
            Vec::<TransformRule>::deserialize(value)
        } else {
            WrappedRuleSet::deserialize(value).map(|wrapped| wrapped.rules)
        }
        .map_err(de::Error::custom)?;

        Ok(Self { rules })
    }
}

impl From<Vec<TransformRule>> for RuleSet {
    fn from(rules: Vec<TransformRule>) -> Self {
        Self::new(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wrapped_rule_set() {
        let rules: RuleSet = serde_json::from_value(json!({
            "rules": [
                {"op": "rename", "from": "db.user", "to": "database.username"},
                {"op": "delete", "path": "db.pass"},
                {"op": "set", "path": "database.port", "value": 5432},
                {"op": "template", "path": "database.url", "template": "postgres://{database.username}@host"},
                {"op": "flatten", "path": "database"},
                {"op": "copy", "from": "a", "to": "b"}
            ]
        }))
        .unwrap();

        let ops: Vec<&str> = rules.rules().iter().map(TransformRule::op).collect();
        assert_eq!(ops, ["rename", "delete", "set", "template", "flatten", "copy"]);
        assert!(matches!(
            &rules.rules()[4],
            TransformRule::Flatten { separator, .. } if separator == "_"
        ));
    }

    #[test]
    fn test_parse_bare_array_and_aliases() {
        let rules: RuleSet = serde_json::from_value(json!([
            {"op": "move", "from": "a", "to": "b"},
            {"op": "template-substitute", "path": "c", "template": "{b}"}
        ]))
        .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules.rules()[0].op(), "rename");
        assert_eq!(rules.rules()[1].op(), "template");
    }

    #[test]
    fn test_rejects_unknown_op_and_bad_locator() {
        assert!(serde_json::from_value::<RuleSet>(json!([{"op": "explode", "path": "a"}])).is_err());
        assert!(serde_json::from_value::<RuleSet>(json!([{"op": "delete", "path": "a..b"}])).is_err());
        assert!(serde_json::from_value::<RuleSet>(json!([{"op": "template", "path": "a", "template": "{x"}])).is_err());
    }

    #[test]
    fn test_wrapped_errors_name_the_bad_rule() {
        let err = serde_json::from_value::<RuleSet>(json!({
            "rules": [{"op": "explode", "path": "a"}]
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("explode"), "{err}");
        assert!(!err.contains("untagged"), "{err}");

        let err = serde_json::from_value::<RuleSet>(json!({
            "rules": [{"op": "delete", "path": "a..b"}]
        }))
        .unwrap_err()
        .to_string();
        assert!(err.contains("a..b"), "{err}");

        assert!(serde_json::from_value::<RuleSet>(json!({"rulez": []})).is_err());
    }

    #[test]
    fn test_empty_rule_set() {
        let rules: RuleSet = serde_json::from_value(json!({"rules": []})).unwrap();
        assert!(rules.is_empty());
    }
}
