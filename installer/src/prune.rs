//! Deny-list pruning for staged runtime trees.
//!
//! The deny list is plain data: a versioned set of name patterns, each scoped
//! to directories or files. [`DenyList::is_denied`] is the only filter the
//! stager consults, so changing what gets pruned never touches copy logic.

use crate::config::PruneConfig;
use crate::error::{PipelineError, Result};
use glob::Pattern;

/// Version of the built-in deny list.
///
/// Bump whenever [`DEFAULT_DIRECTORY_PATTERNS`] or [`DEFAULT_FILE_PATTERNS`]
/// change, since the staged tree for an unchanged environment changes with it.
pub const DENY_LIST_VERSION: u32 = 1;

/// Directory names removed from every staged tree.
pub const DEFAULT_DIRECTORY_PATTERNS: &[&str] =
    &["__pycache__", ".pytest_cache", ".mypy_cache", ".ruff_cache"];

/// File names removed from every staged tree.
pub const DEFAULT_FILE_PATTERNS: &[&str] = &["*.pyc", "*.pyo", ".DS_Store"];

/// Which kind of filesystem entry a pattern applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryScope {
    /// Matches directories only; the whole subtree is skipped.
    Directory,
    /// Matches non-directory entries only.
    File,
}

/// One deny-list pattern.
#[derive(Debug, Clone)]
pub struct DenyRule {
    pattern: Pattern,
    scope: EntryScope,
}

impl DenyRule {
    /// Compile a rule from a glob over entry names.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::StagingCopy`] if the pattern is not a valid glob.
    pub fn new(pattern: &str, scope: EntryScope) -> Result<Self> {
        let compiled = Pattern::new(pattern)
            .map_err(|e| PipelineError::staging(format!("invalid prune pattern {pattern:?}"), e))?;
        Ok(Self {
            pattern: compiled,
            scope,
        })
    }

    /// Return the pattern source text.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Return the entry kind this rule applies to.
    #[must_use]
    pub fn scope(&self) -> EntryScope {
        self.scope
    }

    fn matches(&self, name: &str, is_dir: bool) -> bool {
        let in_scope = match self.scope {
            EntryScope::Directory => is_dir,
            EntryScope::File => !is_dir,
        };
        in_scope && self.pattern.matches(name)
    }
}

/// A versioned, ordered set of [`DenyRule`]s.
///
/// # Examples
///
/// ```
/// use pkgsmith::prune::DenyList;
///
/// let deny = DenyList::builtin();
/// assert!(deny.is_denied("__pycache__", true));
/// assert!(deny.is_denied("module.cpython-311.pyc", false));
/// assert!(!deny.is_denied("module.py", false));
/// // Scoped: a file named like a denied directory is kept.
/// assert!(!deny.is_denied("__pycache__", false));
/// ```
#[derive(Debug, Clone)]
pub struct DenyList {
    version: u32,
    rules: Vec<DenyRule>,
}

impl DenyList {
    /// Return the built-in deny list at [`DENY_LIST_VERSION`].
    #[must_use]
    pub fn builtin() -> Self {
        let rules = DEFAULT_DIRECTORY_PATTERNS
            .iter()
            .map(|p| (*p, EntryScope::Directory))
            .chain(DEFAULT_FILE_PATTERNS.iter().map(|p| (*p, EntryScope::File)))
            .filter_map(|(pattern, scope)| DenyRule::new(pattern, scope).ok())
            .collect();
        Self {
            version: DENY_LIST_VERSION,
            rules,
        }
    }

    /// Return the built-in list extended with the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured pattern is not a valid glob.
    pub fn from_config(config: &PruneConfig) -> Result<Self> {
        let mut list = Self::builtin();
        for pattern in &config.directories {
            list.rules.push(DenyRule::new(pattern, EntryScope::Directory)?);
        }
        for pattern in &config.files {
            list.rules.push(DenyRule::new(pattern, EntryScope::File)?);
        }
        Ok(list)
    }

    /// Return the deny-list version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Return the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[DenyRule] {
        &self.rules
    }

    /// Returns `true` when an entry with this name and kind must be pruned.
    #[must_use]
    pub fn is_denied(&self, name: &str, is_dir: bool) -> bool {
        self.rules.iter().any(|rule| rule.matches(name, is_dir))
    }
}

impl Default for DenyList {
    fn default() -> Self {
        Self::builtin()
    }
}
