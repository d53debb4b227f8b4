//! Path and key exclusion.

use std::collections::BTreeSet;

use vaultdump_common::{Error, Result, SecretPath};

/// Decides which subtrees and leaf keys are left out of an extraction.
///
/// Path matching is segment-wise: ignoring `/secret/db` skips `/secret/db`
/// and everything below it, but not `/secret/dbx`. Key matching is global
/// and exact.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    ignored_keys: BTreeSet<String>,
    ignored_paths: Vec<SecretPath>,
}

impl IgnoreFilter {
    /// Create a filter from already parsed sets. Empty sets filter nothing.
    pub fn new(
        ignored_keys: impl IntoIterator<Item = String>,
        ignored_paths: impl IntoIterator<Item = SecretPath>,
    ) -> Self {
        Self {
            ignored_keys: ignored_keys.into_iter().collect(),
            ignored_paths: ignored_paths.into_iter().collect(),
        }
    }

    /// Create a filter from raw strings, e.g. comma separated CLI values.
    ///
    /// Blank entries are dropped.
    ///
    /// # Errors
    /// - `InvalidInput` if a path entry cannot be parsed or names the root
    pub fn from_strings<K, P>(keys: K, paths: P) -> Result<Self>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let ignored_keys = keys
            .into_iter()
            .map(|key| key.as_ref().trim().to_string())
            .filter(|key| !key.is_empty());

        let ignored_paths = paths
            .into_iter()
            .map(|path| path.as_ref().trim().to_string())
            .filter(|path| !path.is_empty())
            .map(|path| match SecretPath::parse(&path)? {
                parsed if parsed.is_root() => Err(Error::InvalidInput(format!(
                    "Ignored path '{path}' would exclude the whole store"
                ))),
                parsed => Ok(parsed),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(ignored_keys, ignored_paths))
    }

    /// True if `path` equals or lies under an ignored path.
    pub fn should_skip_path(&self, path: &SecretPath) -> bool {
        self.ignored_paths.iter().any(|prefix| path.starts_with(prefix))
    }

    /// True if `key` must be dropped from every leaf.
    pub fn should_skip_key(&self, key: &str) -> bool {
        self.ignored_keys.contains(key)
    }

    /// Check if the filter excludes nothing.
    pub fn is_empty(&self) -> bool {
        self.ignored_keys.is_empty() && self.ignored_paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(raw: &str) -> SecretPath {
        SecretPath::parse(raw).unwrap()
    }

    #[test]
    fn test_empty_filter_skips_nothing() {
        let filter = IgnoreFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.should_skip_path(&path("/secret")));
        assert!(!filter.should_skip_path(&SecretPath::root()));
        assert!(!filter.should_skip_key("password"));
    }

    #[test]
    fn test_path_prefix_is_segment_wise() {
        let filter = IgnoreFilter::from_strings(Vec::<String>::new(), ["secret/db"]).unwrap();

        assert!(filter.should_skip_path(&path("/secret/db")));
        assert!(filter.should_skip_path(&path("/secret/db/replica")));
        assert!(!filter.should_skip_path(&path("/secret/dbx")));
        assert!(!filter.should_skip_path(&path("/secret")));
    }

    #[test]
    fn test_keys_are_global() {
        let filter = IgnoreFilter::from_strings(["pass", " token "], Vec::<String>::new()).unwrap();

        assert!(filter.should_skip_key("pass"));
        assert!(filter.should_skip_key("token"));
        assert!(!filter.should_skip_key("password"));
        assert!(!filter.should_skip_key("Pass"));
    }

    #[test]
    fn test_blank_entries_are_dropped() {
        let filter = IgnoreFilter::from_strings(["", "  "], ["", " "]).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_root_path_is_rejected() {
        for root in ["/", "//", " / "] {
            let err = IgnoreFilter::from_strings(Vec::<String>::new(), [root]).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
    }

    proptest! {
        #[test]
        fn prop_ignored_path_covers_descendants(
            prefix in prop::collection::vec("[a-c]{1,2}", 1..4),
            tail in prop::collection::vec("[a-c]{1,2}", 0..4),
        ) {
            let ignored = SecretPath::from_components(prefix.clone()).unwrap();
            let filter = IgnoreFilter::new(Vec::new(), vec![ignored]);

            let mut full = prefix;
            full.extend(tail);
            let candidate = SecretPath::from_components(full).unwrap();
            prop_assert!(filter.should_skip_path(&candidate));
        }

        #[test]
        fn prop_ancestors_of_ignored_path_are_kept(
            prefix in prop::collection::vec("[a-c]{1,2}", 2..5),
        ) {
            let ignored = SecretPath::from_components(prefix.clone()).unwrap();
            let filter = IgnoreFilter::new(Vec::new(), vec![ignored.clone()]);
            let parent = ignored.parent().unwrap();
            prop_assert!(!filter.should_skip_path(&parent));
        }
    }
}
