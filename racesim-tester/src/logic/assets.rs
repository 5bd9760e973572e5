use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use racesim_kernel::{
    CatalogError, CatalogLoader, CompareParams, EmbeddedDataError, EmbeddedLoader, SkillCatalog,
};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse scenario {}: {source}", .path.display())]
    Scenario {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("skill catalog {}: {source}", .path.display())]
    Catalog { path: PathBuf, source: CatalogError },
    #[error(transparent)]
    Embedded(#[from] EmbeddedDataError),
}

/// Reads the scenario and catalog from disk, or falls back to the bundled copies.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    scenario: Option<PathBuf>,
    catalog: Option<PathBuf>,
}

impl FileLoader {
    #[must_use]
    pub const fn new(scenario: Option<PathBuf>, catalog: Option<PathBuf>) -> Self {
        Self { scenario, catalog }
    }

    /// Digest of each input, `embedded` when the bundled copy is used.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured file cannot be read.
    pub fn provenance(&self) -> Result<Provenance, AssetError> {
        Ok(Provenance {
            scenario: digest_of(self.scenario.as_deref())?,
            catalog: digest_of(self.catalog.as_deref())?,
        })
    }
}

impl CatalogLoader for FileLoader {
    type Error = AssetError;

    fn load_skill_catalog(&self) -> Result<SkillCatalog, Self::Error> {
        let Some(path) = &self.catalog else {
            return Ok(EmbeddedLoader.load_skill_catalog()?);
        };
        let json = read(path)?;
        SkillCatalog::from_json(&json).map_err(|source| AssetError::Catalog {
            path: path.clone(),
            source,
        })
    }

    fn load_scenario(&self) -> Result<CompareParams, Self::Error> {
        let Some(path) = &self.scenario else {
            return Ok(EmbeddedLoader.load_scenario()?);
        };
        let json = read(path)?;
        serde_json::from_str(&json).map_err(|source| AssetError::Scenario {
            path: path.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Provenance {
    pub scenario: String,
    pub catalog: String,
}

fn read(path: &Path) -> Result<String, AssetError> {
    fs::read_to_string(path).map_err(|source| AssetError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn digest_of(path: Option<&Path>) -> Result<String, AssetError> {
    let Some(path) = path else {
        return Ok("embedded".to_string());
    };
    Ok(sha256_hex(read(path)?.as_bytes()))
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_embedded_data() {
        let loader = FileLoader::default();
        assert!(!loader.load_skill_catalog().unwrap().is_empty());
        assert_eq!(loader.load_scenario().unwrap().runner_b.name, "Challenger");
        let provenance = loader.provenance().unwrap();
        assert_eq!(provenance.scenario, "embedded");
        assert_eq!(provenance.catalog, "embedded");
    }

    #[test]
    fn missing_file_names_the_path() {
        let loader = FileLoader::new(Some(PathBuf::from("/nonexistent/scenario.json")), None);
        let err = loader.load_scenario().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scenario.json"));
    }

    #[test]
    fn sha256_hex_is_lowercase_and_fixed_width() {
        let hex = sha256_hex(b"abc");
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
