// Report settings and the mapping from logical fields to spreadsheet headers.
//
// Defaults follow the headers of the complaint exports the tool was built
// for. A TOML file can override any of them, e.g.
//
//     top_n = 5
//     [columns]
//     family = "FAMILY"
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

/// Header names are matched exactly (case and accents included).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnMap {
    pub creation_date: String,
    pub closure_date: String,
    pub family: String,
    pub status: String,
    pub responsible: String,
    pub channel_source: String,
    pub founded_flag: String,
    pub restitution_flag: String,
    pub restitution_amount: String,
    pub responsible_entity: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            creation_date: "DATE CREATION".to_string(),
            closure_date: "DATE CLOTURE".to_string(),
            family: "FAMILLE".to_string(),
            status: "STATUS".to_string(),
            responsible: "RESPONSABLE".to_string(),
            channel_source: "CANAL".to_string(),
            founded_flag: "FONDEE".to_string(),
            restitution_flag: "RESTITUTION".to_string(),
            restitution_amount: "MONTANT RESTITUTION".to_string(),
            responsible_entity: "ENTITE RESPONSABLE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub columns: ColumnMap,
    /// Distinct values shown by name in a distribution before the rest are
    /// merged into "Other".
    pub top_n: usize,
    /// Rows printed in the terminal preview of the filtered table.
    pub preview_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            top_n: 4,
            preview_rows: 5,
        }
    }
}

impl ReportConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&s)?;
        tracing::debug!(path = %path.display(), "loaded report configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ReportConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReportConfig::default());
        assert_eq!(config.top_n, 4);
        assert_eq!(config.columns.creation_date, "DATE CREATION");
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = ReportConfig::from_toml_str(
            "top_n = 6\n[columns]\nfamily = \"Famille produit\"\n",
        )
        .unwrap();
        assert_eq!(config.top_n, 6);
        assert_eq!(config.columns.family, "Famille produit");
        assert_eq!(config.columns.status, "STATUS");
        assert_eq!(config.preview_rows, 5);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let err = ReportConfig::from_toml_str("top_n = \"four\"").unwrap_err();
        assert!(matches!(err, crate::error::ReportError::Config(_)));
    }
}
