//! Recursive secret tree extraction.

use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use tracing::{debug, info};

use vaultdump_common::{Error, Node, Result, ResultTree, SecretPath};
use vaultdump_store::{SecretStore, SecretValues};

use crate::ignore::IgnoreFilter;

/// Walks a secret store depth-first and assembles a [`ResultTree`].
///
/// Siblings are visited in sorted order. With a concurrency above one, up to
/// that many sibling subtrees of the same branch are walked at once; each
/// returns its own subtree and only the parent merges them, so no mapping is
/// ever shared between in-flight walks.
pub struct SecretTreeWalker<S> {
    store: S,
    filter: IgnoreFilter,
    concurrency: usize,
}

impl<S: SecretStore> SecretTreeWalker<S> {
    /// Create a sequential walker.
    pub fn new(store: S, filter: IgnoreFilter) -> Self {
        Self {
            store,
            filter,
            concurrency: 1,
        }
    }

    /// Walk up to `concurrency` sibling subtrees at a time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Get the ignore filter.
    pub fn filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    /// Extract everything under `root`.
    ///
    /// The returned tree holds the extracted nodes at their full store paths.
    ///
    /// # Errors
    /// - `ExtractionFailed` wrapping the first store error that retry could
    ///   not resolve, tagged with the path it occurred at
    /// - `Cancelled` if the store client was cancelled
    pub async fn walk(&self, root: &SecretPath) -> Result<ResultTree> {
        info!(path = %root, store = self.store.name(), "Starting extraction");

        let mut tree = ResultTree::new();
        if let Some(node) = self.walk_node(root.clone()).await? {
            place(&mut tree, root, node)?;
        }

        info!(path = %root, secrets = tree.count_values(), "Extraction complete");
        Ok(tree)
    }

    /// Extract several roots into one tree. Fails as a whole if any root fails.
    pub async fn walk_all(&self, roots: &[SecretPath]) -> Result<ResultTree> {
        let mut tree = ResultTree::new();
        for root in roots {
            tree.merge(self.walk(root).await?);
        }
        Ok(tree)
    }

    /// Resolve one node. `None` means the path is ignored.
    fn walk_node(&self, path: SecretPath) -> BoxFuture<'_, Result<Option<Node>>> {
        async move {
            if self.filter.should_skip_path(&path) {
                debug!(path = %path, "Skipping ignored path");
                return Ok(None);
            }

            let mut children = self
                .store
                .list_children(&path)
                .await
                .map_err(|e| extraction_failed(&path, e))?;

            if children.is_empty() {
                let values = self
                    .store
                    .read_leaf(&path)
                    .await
                    .map_err(|e| extraction_failed(&path, e))?;
                return Ok(Some(Node::leaf(self.filter_leaf(&path, values))));
            }

            children.sort();
            children.dedup();
            debug!(path = %path, children = children.len(), "Descending into branch");

            let subtrees: Vec<(String, Option<Node>)> = stream::iter(children)
                .map(|child| {
                    let parent = &path;
                    async move {
                        let name = child_name(parent, &child)?;
                        let node = self.walk_node(child).await?;
                        Ok::<_, Error>((name, node))
                    }
                })
                .buffered(self.concurrency)
                .try_collect()
                .await?;

            let mut branch = ResultTree::new();
            for (name, node) in subtrees {
                if let Some(node) = node {
                    branch.insert(name, node);
                }
            }
            Ok(Some(Node::Tree(branch)))
        }
        .boxed()
    }

    /// Drop ignored keys. A leaf left empty is still returned.
    fn filter_leaf(&self, path: &SecretPath, values: SecretValues) -> SecretValues {
        let total = values.len();
        let kept: SecretValues = values
            .into_iter()
            .filter(|(key, _)| !self.filter.should_skip_key(key))
            .collect();

        if kept.len() < total {
            debug!(path = %path, dropped = total - kept.len(), "Dropped ignored keys");
        }
        kept
    }
}

/// The key a child occupies inside its parent's mapping.
fn child_name(parent: &SecretPath, child: &SecretPath) -> Result<String> {
    match (child.parent(), child.name()) {
        (Some(ref p), Some(name)) if p == parent => Ok(name.to_string()),
        _ => Err(extraction_failed(
            parent,
            Error::Permanent(format!("Store listed {child} as a child of {parent}")),
        )),
    }
}

fn place(tree: &mut ResultTree, root: &SecretPath, node: Node) -> Result<()> {
    if root.is_root() {
        match node {
            Node::Tree(subtree) => tree.merge(subtree),
            Node::Value(_) => {
                return Err(Error::InvalidInput(
                    "Store root resolved to a bare value".to_string(),
                ))
            }
        }
    } else {
        tree.insert_at(root.components(), node)?;
    }
    Ok(())
}

fn extraction_failed(path: &SecretPath, err: Error) -> Error {
    match err {
        Error::Cancelled => Error::Cancelled,
        err @ Error::ExtractionFailed { .. } => err,
        cause => Error::ExtractionFailed {
            path: path.clone(),
            cause: Box::new(cause),
        },
    }
}
