use std::fmt;

/// A convenient result type wrapping [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct LookupError {
    pub entry: String,
}

#[derive(Debug)]
pub struct LoadingError {
    pub entry: String,
    pub path: String,
}

#[derive(Debug)]
pub struct DecodeError {
    pub path: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct ComputeError {
    pub texture: String,
    pub reason: String,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not find requested entry {} in registry!", self.entry)
    }
}

impl fmt::Display for LoadingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to load requested entry {}! Attempted path: {}",
            self.entry, self.path
        )
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to decode image {}: {}", self.path, self.reason)
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tile compute failed for texture {}: {}",
            self.texture, self.reason
        )
    }
}

impl std::error::Error for LookupError {}

impl std::error::Error for LoadingError {}

impl std::error::Error for DecodeError {}

impl std::error::Error for ComputeError {}

#[derive(Debug)]
pub enum Error {
    Lookup(LookupError),
    Loading(LoadingError),
    Decode(DecodeError),
    Compute(ComputeError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lookup(err) => err.fmt(f),
            Error::Loading(err) => err.fmt(f),
            Error::Decode(err) => err.fmt(f),
            Error::Compute(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Lookup(err) => Some(err),
            Error::Loading(err) => Some(err),
            Error::Decode(err) => Some(err),
            Error::Compute(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Loading(LoadingError {
            entry: "IO Loading Error".to_string(),
            path: value.to_string(),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Loading(LoadingError {
            entry: "JSON FILE".to_string(),
            path: value.to_string(),
        })
    }
}

impl From<image::ImageError> for Error {
    fn from(value: image::ImageError) -> Self {
        Error::Decode(DecodeError {
            path: "[UNKNOWN]".to_string(),
            reason: value.to_string(),
        })
    }
}
