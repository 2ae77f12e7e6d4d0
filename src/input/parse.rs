use super::provision_request::ProvisionRequest;
use crate::error::ProvisionError;
use std::fs;
use std::path::Path;

impl ProvisionRequest {
    /// Parses a JSON request. Absent fields keep their defaults, so
    /// `{"database": "app"}` provisions the default user and collection
    /// into `app`.
    pub fn from_json_str(input: &str) -> Result<Self, ProvisionError> {
        let req: ProvisionRequest = serde_json::from_str(input)
            .map_err(|e| ProvisionError::Request(format!("Error parsing request JSON: {}", e)))?;
        req.validate().map_err(ProvisionError::InvalidRequest)?;
        Ok(req)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ProvisionError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ProvisionError::Request(format!(
                "Error reading request file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }
}
