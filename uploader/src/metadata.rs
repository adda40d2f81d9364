use serde_json::Map;
use serde_json::Value;

/// Checks recording metadata before it is sent to the server and returns the
/// form that should be sent. An `Err` carries a human readable reason and
/// fails the upload.
pub trait MetadataValidator: Send + Sync {
    fn validate(&self, metadata: &Map<String, Value>) -> Result<Map<String, Value>, String>;
}

/// Sends metadata as recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughValidator;

impl MetadataValidator for PassthroughValidator {
    fn validate(&self, metadata: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        Ok(metadata.clone())
    }
}
