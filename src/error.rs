use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabelError>;

#[derive(Debug, Error)]
pub enum LabelError {
    /// A display-node metric was missing or non-finite; nothing was mutated.
    #[error("measurement unavailable: {0}")]
    MeasurementUnavailable(String),
    #[error("barcode rasterization failed: {0}")]
    Rasterization(String),
    #[error("image embedding failed: {0}")]
    ImageEmbed(String),
    /// Fatal for the whole print job.
    #[error("font load failed: {0}")]
    FontLoad(String),
    #[error("invalid font data: {0}")]
    InvalidFont(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
