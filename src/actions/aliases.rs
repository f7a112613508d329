//! Diagnostic id translation for fix providers
//!
//! Some diagnostics are reported under a compiler id while the provider that
//! fixes them declares an analyzer id. The table maps the former to the
//! latter so such diagnostics still reach their provider.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixIdAliases {
    aliases: IndexMap<String, Vec<String>>,
}

impl Default for FixIdAliases {
    /// The unused-import compiler warning maps to the remove-unnecessary-imports
    /// fix.
    fn default() -> Self {
        Self::empty().with_alias("CS8019", "IDE0005")
    }
}

impl FixIdAliases {
    pub fn empty() -> Self {
        Self {
            aliases: IndexMap::new(),
        }
    }

    pub fn with_alias(mut self, reported: impl Into<String>, fixable: impl Into<String>) -> Self {
        self.insert(reported, fixable);
        self
    }

    pub fn insert(&mut self, reported: impl Into<String>, fixable: impl Into<String>) {
        let targets = self.aliases.entry(reported.into()).or_default();
        let fixable = fixable.into();
        if !targets.contains(&fixable) {
            targets.push(fixable);
        }
    }

    /// Ids a diagnostic reported as `id` is offered under: its own, then its
    /// aliases.
    pub fn ids_for<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> {
        std::iter::once(id).chain(
            self.aliases
                .get(id)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }

    /// Whether a provider declaring `fixable` can receive a diagnostic
    /// reported as `id`.
    pub fn is_eligible(&self, fixable: &[&str], id: &str) -> bool {
        self.ids_for(id).any(|candidate| fixable.contains(&candidate))
    }
}

impl<R: Into<String>, F: Into<String>> Extend<(R, F)> for FixIdAliases {
    fn extend<T: IntoIterator<Item = (R, F)>>(&mut self, iter: T) {
        for (reported, fixable) in iter {
            self.insert(reported, fixable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["IDE0005"], "CS8019", true)]
    #[case(&["CS8019"], "CS8019", true)]
    #[case(&["IDE0005"], "IDE0005", true)]
    #[case(&["CS0101"], "CS8019", false)]
    #[case(&[], "CS8019", false)]
    #[case(&["CS8019"], "IDE0005", false)]
    fn default_table_eligibility(#[case] fixable: &[&str], #[case] id: &str, #[case] expected: bool) {
        assert_eq!(FixIdAliases::default().is_eligible(fixable, id), expected);
    }

    #[test]
    fn ids_for_lists_own_id_first() {
        let aliases = FixIdAliases::default();
        assert_eq!(aliases.ids_for("CS8019").collect::<Vec<_>>(), vec!["CS8019", "IDE0005"]);
        assert_eq!(aliases.ids_for("CS0101").collect::<Vec<_>>(), vec!["CS0101"]);
    }

    #[test]
    fn table_is_extensible() {
        let mut aliases = FixIdAliases::default();
        aliases.extend([("CS0105", "IDE0005"), ("CS8019", "IDE0005")]);

        assert!(aliases.is_eligible(&["IDE0005"], "CS0105"));
        assert_eq!(aliases.ids_for("CS8019").count(), 2);
    }
}
