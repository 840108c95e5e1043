use crate::domain::model::{Credentials, Payload, WebserviceDescriptor};
use crate::utils::error::{ConvertError, Result};
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Read-only view of the webservice catalog. Reads must be deterministic for a given catalog.
pub trait FieldCatalog: Send + Sync {
    fn list_webservices(&self) -> Result<Vec<String>>;
    fn list_fields(&self, id: &str) -> Result<Vec<String>>;

    fn descriptor(&self, id: &str) -> Result<WebserviceDescriptor> {
        let fields = self.list_fields(id)?;
        Ok(WebserviceDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            fields,
        })
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.list_webservices()?.iter().any(|ws| ws == id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
}

/// Submits one rendered payload. Non-2xx statuses are responses, not errors;
/// `Err` means no response was obtained at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        payload: &Payload,
    ) -> std::result::Result<TransportResponse, ConvertError>;
}
