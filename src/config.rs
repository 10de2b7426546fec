use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use crate::abstraction::{AbstractionError, AbstractionResult, DEFAULT_GRID_SIZE};

/// Tunables for the abstraction and its subgoal database.
///
/// Loaded from RON, e.g.
/// ```ron
/// (
///     grid_size: 16,
///     num_neighbour_levels: 2,
///     search_iteration_cap: 200000,
///     compress_iteration_cap: 4096,
///     verify_after_edit: false,
///     database_path: Some("out/db.bin"),
/// )
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbstractionConfig {
    /// Sector edge length in cells.
    pub grid_size: usize,
    /// Maximum hop distance stored in the database.
    pub num_neighbour_levels: usize,
    /// Expansion cap for A* between reps.
    pub search_iteration_cap: usize,
    /// Step cap for greedy reachability during subgoal compression.
    pub compress_iteration_cap: usize,
    /// Run the full invariant check after every edit.
    pub verify_after_edit: bool,
    /// Export the database here after every patch.
    pub database_path: Option<PathBuf>,
}

impl Default for AbstractionConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            num_neighbour_levels: 2,
            search_iteration_cap: 200_000,
            compress_iteration_cap: 4_096,
            verify_after_edit: false,
            database_path: None,
        }
    }
}

impl AbstractionConfig {
    /// Parse a RON document and validate it.
    pub fn from_ron(contents: &str) -> AbstractionResult<Self> {
        let config: AbstractionConfig = ron::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a RON config file. Missing or malformed files fall back to the
    /// defaults with an error log. Values that parse but fail validation are
    /// an error.
    pub fn load(path: &Path) -> AbstractionResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => match ron::from_str::<AbstractionConfig>(&contents) {
                Ok(config) => {
                    config.validate()?;
                    info!("Loaded abstraction config from {}", path.display());
                    Ok(config)
                }
                Err(e) => {
                    error!("Failed to parse abstraction config: {}", e);
                    error!("Using default AbstractionConfig");
                    Ok(Self::default())
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                error!("Using default AbstractionConfig");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> AbstractionResult<()> {
        if self.grid_size == 0 {
            return Err(AbstractionError::InvalidConfig("grid_size must be at least 1".into()));
        }
        if self.num_neighbour_levels == 0 {
            return Err(AbstractionError::InvalidConfig(
                "num_neighbour_levels must be at least 1".into(),
            ));
        }
        if self.search_iteration_cap == 0 || self.compress_iteration_cap == 0 {
            return Err(AbstractionError::InvalidConfig("iteration caps must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_keeps_defaults() {
        let config = AbstractionConfig::from_ron("(grid_size: 8, verify_after_edit: true)").unwrap();
        assert_eq!(config.grid_size, 8);
        assert!(config.verify_after_edit);
        assert_eq!(config.num_neighbour_levels, 2);
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn zero_levels_rejected() {
        let err = AbstractionConfig::from_ron("(num_neighbour_levels: 0)").unwrap_err();
        assert!(matches!(err, AbstractionError::InvalidConfig(_)));
        let err = AbstractionConfig::from_ron("(grid_size: 0)").unwrap_err();
        assert!(matches!(err, AbstractionError::InvalidConfig(_)));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = AbstractionConfig::load(Path::new("does/not/exist.ron")).unwrap();
        assert_eq!(config, AbstractionConfig::default());
    }
}
