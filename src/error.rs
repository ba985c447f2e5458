use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to initialize OCR engine: {0}")]
    InitializationError(String),

    #[error("Recognition failed: {0}")]
    RecognitionError(String),

    #[error("Recognition timed out after {0} ms")]
    RecognitionTimeout(u64),

    #[error("Failed to acquire frame: {0}")]
    AcquisitionError(String),

    #[error("Invalid region of interest: {0}")]
    InvalidRoi(String),

    #[error("Measurement log error: {0}")]
    MeasurementLogError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Whether the driving loop can skip the cycle and carry on
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            OcrError::InitializationError(_) | OcrError::AcquisitionError(_)
        )
    }
}
