use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryboardError {
    #[error("Invalid grid cell index {0} (expected 0-8)")]
    InvalidCellIndex(usize),

    #[error("Unknown shot type id '{0}'")]
    UnknownShotId(String),

    #[error("Shot type '{0}' is assigned in the grid but missing from the catalog")]
    CatalogLookupFailure(String),

    #[error("No images provided for scene analysis")]
    EmptyInput,

    #[error("Scene analysis failed: {0}")]
    AnalysisService(String),
}

pub type Result<T> = std::result::Result<T, StoryboardError>;
