//! Name filtering shared by the walker and the precount pass.

use globset::{Glob, GlobSet, GlobSetBuilder};

use sizetree_core::{ScanConfig, ScanError};

/// Decides which directory entries are left out of the tree.
#[derive(Debug, Clone)]
pub(crate) struct EntryFilter {
    include_hidden: bool,
    ignore: GlobSet,
}

impl EntryFilter {
    /// Compile the config's ignore patterns.
    pub fn new(config: &ScanConfig) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self {
            include_hidden: config.include_hidden,
            ignore,
        })
    }

    /// Check if an entry with this name is skipped.
    pub fn is_excluded(&self, name: &str) -> bool {
        (!self.include_hidden && name.starts_with('.')) || self.ignore.is_match(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_patterns() {
        let config = ScanConfig::builder()
            .root("/test")
            .ignore_patterns(vec!["node_modules".to_string(), "*.log".to_string()])
            .build()
            .unwrap();
        let filter = EntryFilter::new(&config).unwrap();

        assert!(filter.is_excluded("node_modules"));
        assert!(filter.is_excluded("test.log"));
        assert!(!filter.is_excluded("src"));
        assert!(!filter.is_excluded(".git"));
    }

    #[test]
    fn test_hidden_entries() {
        let mut config = ScanConfig::new("/test");
        config.include_hidden = false;
        let filter = EntryFilter::new(&config).unwrap();
        assert!(filter.is_excluded(".git"));
        assert!(!filter.is_excluded("git"));
    }

    #[test]
    fn test_invalid_pattern() {
        let mut config = ScanConfig::new("/test");
        config.ignore_patterns = vec!["a[".to_string()];
        assert!(matches!(
            EntryFilter::new(&config),
            Err(ScanError::InvalidPattern { .. })
        ));
    }
}
