//! Declarative document transforms for vault-dump.
//!
//! A [`RuleSet`] is an ordered list of [`TransformRule`]s. The
//! [`TransformEngine`] applies them one after another to a copy of a
//! [`ResultTree`](vaultdump_common::ResultTree); every rule sees the document
//! exactly as the previous rules left it.
//!
//! Rule sets deserialize from documents shaped like:
//!
//! ```json
//! {"rules": [
//!   {"op": "rename", "from": "db.user", "to": "database.username"},
//!   {"op": "template", "path": "database.url", "template": "postgres://{database.username}@host"},
//!   {"op": "delete", "path": "db"}
//! ]}
//! ```

pub mod engine;
pub mod rule;
pub mod template;

pub use engine::{apply, TransformEngine};
pub use rule::{RuleSet, TransformRule};
pub use template::Template;
