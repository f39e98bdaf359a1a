/// Failures raised by the pipeline stages.
///
/// Numeric degeneracy (constant columns, empty adoption totals) is never an
/// error; those cases resolve to 0 inside the stage that meets them.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("data error: {0}")]
    Data(String),
}
