use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Crop region is empty after clamping: {width}x{height} at ({left}, {top})")]
    InvalidRegion {
        left: i64,
        top: i64,
        width: i64,
        height: i64,
    },

    #[error("Unsupported rotation: {0} degrees is not a multiple of 90")]
    UnsupportedRotation(i32),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(u32, u32),

    #[error("RGBA buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
