//! Sequential rule interpreter.

use serde_json::Value;
use tracing::{debug, info};

use vaultdump_common::{Error, Node, Result, ResultTree};

use crate::rule::{RuleSet, TransformRule};

/// Applies rule sets to documents.
///
/// The engine is stateless: every call starts from a clean copy of the
/// input and the first rule. The input document is never modified, so the
/// same source can be transformed repeatedly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformEngine;

impl TransformEngine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Apply every rule in order to a copy of `document`.
    ///
    /// # Errors
    /// - `TransformFailed` with the zero-based index of the first rule that
    ///   could not be applied; no partially transformed document is returned
    pub fn apply(&self, rules: &RuleSet, document: &ResultTree) -> Result<ResultTree> {
        let mut working = document.clone();

        for (rule_index, rule) in rules.rules().iter().enumerate() {
            debug!(rule = rule_index, op = rule.op(), "Applying transform rule");
            apply_rule(&mut working, rule).map_err(|cause| Error::TransformFailed {
                rule_index,
                cause: Box::new(cause),
            })?;
        }

        info!(rules = rules.len(), "Transform complete");
        Ok(working)
    }
}

/// Apply `rules` to `document` with a fresh [`TransformEngine`].
pub fn apply(rules: &RuleSet, document: &ResultTree) -> Result<ResultTree> {
    TransformEngine::new().apply(rules, document)
}

fn apply_rule(doc: &mut ResultTree, rule: &TransformRule) -> Result<()> {
    match rule {
        TransformRule::Delete { path } => {
            doc.remove_at(path.segments())?;
        }
        TransformRule::Rename { from, to } => {
            if let Some(node) = doc.remove_at(from.segments())? {
                doc.insert_at(to.segments(), node)?;
            }
        }
        TransformRule::Copy { from, to } => {
            if let Some(node) = doc.get_at(from.segments())?.cloned() {
                doc.insert_at(to.segments(), node)?;
            }
        }
        TransformRule::Set { path, value } => {
            doc.insert_at(path.segments(), Node::from(value.clone()))?;
        }
        TransformRule::Template { path, template } => {
            let rendered = template.render(doc)?;
            doc.insert_at(path.segments(), Node::Value(Value::String(rendered)))?;
        }
        TransformRule::Flatten { path, separator } => match doc.get_at(path.segments())? {
            None => {}
            Some(Node::Tree(tree)) => {
                let flat = tree.flatten(separator)?;
                doc.insert_at(path.segments(), Node::Tree(flat))?;
            }
            Some(Node::Value(_)) => {
                return Err(Error::ShapeMismatch(format!(
                    "cannot flatten '{path}': not a mapping"
                )))
            }
        },
    }
    Ok(())
}
