use bayer::BayerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("expected even non-zero mosaic dimensions but got: {width}x{height}")]
    OddDimensions { width: usize, height: usize },

    #[error("expected a buffer of {expected} samples but got: {found}")]
    BufferSize { expected: usize, found: usize },

    #[error("expected every image to be {expected:?} but got: {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("got {intensities} intensity images for {matrices} polarizer measurements")]
    MeasurementMismatch { intensities: usize, matrices: usize },

    #[error("at least one intensity image is required")]
    EmptyStack,

    #[error(transparent)]
    Debayer(#[from] BayerError),
}
