use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy of the analysis pipeline.
///
/// Resolver and validation errors surface to the caller before any stage
/// runs. `DataSource` is produced by NDVI providers and absorbed by the
/// synthetic fallback; it never leaves the data source.
#[derive(Debug, Error)]
pub enum CropError {
    #[error("administrative unit not found: {0}")]
    NotFound(String),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("classifier model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("data source error: {0}")]
    DataSource(String),

    #[error("administrative dataset error: {0}")]
    Dataset(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CropResult<T> = std::result::Result<T, CropError>;

/// Serializable discriminant of [`CropError`], used in failure results and
/// for mapping to HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    InvalidBounds,
    InvalidParameter,
    ModelUnavailable,
    DataSource,
    Dataset,
    Internal,
}

impl CropError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CropError::NotFound(_) => ErrorKind::NotFound,
            CropError::InvalidBounds(_) => ErrorKind::InvalidBounds,
            CropError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            CropError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            CropError::DataSource(_) => ErrorKind::DataSource,
            CropError::Dataset(_) => ErrorKind::Dataset,
            CropError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Wrap an `anyhow` chain from a provider into a data source error,
    /// keeping every context layer in the message.
    pub fn data_source(err: anyhow::Error) -> Self {
        CropError::DataSource(format!("{:#}", err))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::InvalidBounds => "InvalidBoundsError",
            ErrorKind::InvalidParameter => "InvalidParameterError",
            ErrorKind::ModelUnavailable => "ModelUnavailableError",
            ErrorKind::DataSource => "DataSourceError",
            ErrorKind::Dataset => "DatasetError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            CropError::NotFound("Atlantis".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CropError::ModelUnavailable("missing".into()).kind(),
            ErrorKind::ModelUnavailable
        );
    }

    #[test]
    fn test_data_source_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("tile 3 failed");
        let wrapped = CropError::data_source(err);
        let message = wrapped.to_string();
        assert!(message.contains("tile 3 failed"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_kind_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidBounds).unwrap();
        assert_eq!(json, "\"invalidBounds\"");
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFoundError");
    }
}
