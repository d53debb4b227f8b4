//! Walk a store, then reshape the result with a rule set.

use serde_json::json;

use vaultdump_common::{ResultTree, SecretPath};
use vaultdump_extract::{IgnoreFilter, SecretTreeWalker};
use vaultdump_store::MemoryStore;
use vaultdump_transform::{RuleSet, TransformEngine};

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_secret("/secret/db", json!({"user": "alice", "pass": "s3cr3t"}))
        .unwrap()
        .with_secret("/secret/api", json!({"key": "abc", "internal_note": "x"}))
        .unwrap()
}

fn rules() -> RuleSet {
    serde_json::from_value(json!({
        "rules": [
            {"op": "rename", "from": "secret.db.user", "to": "database.username"},
            {"op": "template", "path": "database.url", "template": "postgres://{database.username}@db.internal"},
            {"op": "delete", "path": "secret.db"},
            {"op": "move", "from": "secret.api", "to": "api"}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn walk_then_transform() {
    let filter = IgnoreFilter::from_strings(["internal_note"], Vec::<String>::new()).unwrap();
    let walker = SecretTreeWalker::new(store(), filter);

    let extracted = walker.walk(&SecretPath::root()).await.unwrap();
    let shaped = TransformEngine::new().apply(&rules(), &extracted).unwrap();

    assert_eq!(
        shaped.to_value(),
        json!({
            "api": {"key": "abc"},
            "database": {"username": "alice", "url": "postgres://alice@db.internal"}
        })
    );
}

#[tokio::test]
async fn pipeline_output_is_deterministic() {
    let walker = SecretTreeWalker::new(store(), IgnoreFilter::default()).with_concurrency(4);
    let engine = TransformEngine::new();
    let rules = rules();

    let mut outputs = Vec::new();
    for _ in 0..3 {
        let extracted = walker.walk(&SecretPath::root()).await.unwrap();
        let shaped: ResultTree = engine.apply(&rules, &extracted).unwrap();
        outputs.push(serde_json::to_string_pretty(&shaped).unwrap());
    }

    assert!(outputs.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn transform_can_rerun_on_same_source() {
    let extracted = SecretTreeWalker::new(store(), IgnoreFilter::default())
        .walk(&SecretPath::root())
        .await
        .unwrap();
    let before = extracted.clone();

    let first = TransformEngine::new().apply(&rules(), &extracted).unwrap();
    let second = TransformEngine::new().apply(&rules(), &extracted).unwrap();

    assert_eq!(first, second);
    assert_eq!(extracted, before);
}
