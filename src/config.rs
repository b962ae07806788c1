//! Trie configuration
//!
//! ```
//! use termtrie::config::TrieConfig;
//!
//! let config = TrieConfig::from_toml_str(r#"
//!     table_space = 1048576
//!     cycle_check_interval = 500
//! "#).unwrap();
//! assert_eq!(config.table_space, Some(1 << 20));
//! assert!(!config.shared);
//! ```

use serde::Deserialize;

use crate::errors::{TrieError, TrieResult};
use crate::term::Heap;

/// Configuration for a trie
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrieConfig {
    /// Byte budget for trie nodes (`None` = unlimited)
    pub table_space: Option<usize>,
    /// Mark the trie as shared between threads of a tabling engine
    pub shared: bool,
    /// Check a key for cycles after this many compound subterms
    pub cycle_check_interval: usize,
    /// Initial cell capacity of heaps created for reconstruction
    pub heap_cells: usize,
    /// Hard limit reconstruction heaps may grow to. Scratch copies of keys
    /// passed as owned terms only take their initial size from `heap_cells`.
    pub max_heap_cells: usize,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            table_space: None,
            shared: false,
            cycle_check_interval: 1000,
            heap_cells: Heap::DEFAULT_CAPACITY,
            max_heap_cells: Heap::DEFAULT_MAX_CAPACITY,
        }
    }
}

impl TrieConfig {
    /// Parse a configuration from TOML; missing fields take their defaults
    pub fn from_toml_str(source: &str) -> TrieResult<Self> {
        let config: TrieConfig =
            toml::from_str(source).map_err(|e| TrieError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_table_space(mut self, bytes: usize) -> Self {
        self.table_space = Some(bytes);
        self
    }

    pub fn with_heap_cells(mut self, initial: usize, max: usize) -> Self {
        self.heap_cells = initial;
        self.max_heap_cells = max;
        self
    }

    pub(crate) fn validate(&self) -> TrieResult<()> {
        if self.cycle_check_interval == 0 {
            return Err(TrieError::InvalidConfig(
                "cycle_check_interval must be positive".to_string(),
            ));
        }
        if self.heap_cells == 0 || self.max_heap_cells < self.heap_cells {
            return Err(TrieError::InvalidConfig(format!(
                "heap_cells ({}) must be positive and at most max_heap_cells ({})",
                self.heap_cells, self.max_heap_cells
            )));
        }
        Ok(())
    }

    pub(crate) fn new_heap(&self) -> Heap {
        Heap::with_capacity(self.heap_cells, self.max_heap_cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrieConfig::default();
        assert_eq!(config.cycle_check_interval, 1000);
        assert!(config.table_space.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = TrieConfig::from_toml_str("no_such_option = true").unwrap_err();
        assert!(matches!(err, TrieError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_heap_bounds() {
        let err = TrieConfig::from_toml_str("heap_cells = 64\nmax_heap_cells = 8").unwrap_err();
        assert!(matches!(err, TrieError::InvalidConfig(_)));
    }
}
