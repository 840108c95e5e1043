use crate::domain::model::WebserviceDescriptor;
use crate::domain::ports::FieldCatalog;
use crate::utils::error::{ConvertError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    webservice: Vec<WebserviceDescriptor>,
}

/// Fixed, in-memory catalog. Webservice and field order is the order they were given in.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    webservices: Vec<WebserviceDescriptor>,
}

impl StaticCatalog {
    pub fn new(webservices: Vec<WebserviceDescriptor>) -> Result<Self> {
        let mut ids = HashSet::new();
        for ws in &webservices {
            if !ids.insert(ws.id.as_str()) {
                return Err(ConvertError::Catalog {
                    message: format!("webservice '{}' is defined twice", ws.id),
                });
            }
        }
        Ok(Self { webservices })
    }

    /// Parses `[[webservice]]` tables with `id`, optional `name` and `fields`.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::new(file.webservice)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    fn find(&self, id: &str) -> Result<&WebserviceDescriptor> {
        self.webservices
            .iter()
            .find(|ws| ws.id == id)
            .ok_or_else(|| ConvertError::Catalog {
                message: format!("unknown webservice '{}'", id),
            })
    }
}

impl FieldCatalog for StaticCatalog {
    fn list_webservices(&self) -> Result<Vec<String>> {
        Ok(self.webservices.iter().map(|ws| ws.id.clone()).collect())
    }

    fn list_fields(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.find(id)?.fields.clone())
    }

    fn descriptor(&self, id: &str) -> Result<WebserviceDescriptor> {
        let mut descriptor = self.find(id)?.clone();
        if descriptor.name.is_empty() {
            descriptor.name = descriptor.id.clone();
        }
        Ok(descriptor)
    }
}
