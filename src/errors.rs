//! Errors specific to reading executables and producing identity artifacts.

use std::{io::Error as IOError, path::PathBuf};

#[cfg(feature = "images")]
use image::ImageError;

/// Error that can occur when reading and parsing bytes.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ReadError(pub String);

/// Errors that can occur when reading a PE image.
#[derive(Debug, thiserror::Error)]
pub enum ImageReadError {
    #[error("invalid bytes: {0}")]
    InvalidBytes(ReadError),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("invalid section: {0}")]
    InvalidSection(String),
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<ReadError> for ImageReadError {
    fn from(error: ReadError) -> Self { ImageReadError::InvalidBytes(error) }
}
impl From<IOError> for ImageReadError {
    fn from(error: IOError) -> Self { ImageReadError::IOError(error) }
}

/// Errors that can occur when reading resource data.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("missing resource: {0}")]
    MissingResource(String),
    #[error("invalid table: {0}")]
    InvalidTable(String),
    #[error("invalid bytes: {0}")]
    InvalidBytes(ReadError),
    #[error("invalid image: {0}")]
    InvalidImage(ImageReadError),
    #[cfg(feature = "images")]
    #[error("invalid icon: {0}")]
    InvalidIconResource(ImageError),
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<ReadError> for ResourceError {
    fn from(error: ReadError) -> Self { ResourceError::InvalidBytes(error) }
}
impl From<ImageReadError> for ResourceError {
    fn from(error: ImageReadError) -> Self {
        match error {
            ImageReadError::IOError(error) => ResourceError::IOError(error),
            error => ResourceError::InvalidImage(error),
        }
    }
}
#[cfg(feature = "images")]
impl From<ImageError> for ResourceError {
    fn from(error: ImageError) -> Self { ResourceError::InvalidIconResource(error) }
}
impl From<IOError> for ResourceError {
    fn from(error: IOError) -> Self { ResourceError::IOError(error) }
}

/// Errors that can occur when patching a manifest template.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest template not found: {0}")]
    MissingTemplate(PathBuf),
    #[error("manifest has no assemblyIdentity element")]
    MissingAssemblyIdentity,
    #[error("manifest text encoding cannot be preserved")]
    UnsupportedEncoding,
    #[error("invalid xml: {0}")]
    InvalidXml(roxmltree::Error),
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<roxmltree::Error> for ManifestError {
    fn from(error: roxmltree::Error) -> Self { ManifestError::InvalidXml(error) }
}
impl From<IOError> for ManifestError {
    fn from(error: IOError) -> Self { ManifestError::IOError(error) }
}

/// Errors that can occur when writing the identity artifacts of a replacement executable.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("manifest error: {0}")]
    Manifest(ManifestError),
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<ManifestError> for ArtifactError {
    fn from(error: ManifestError) -> Self { ArtifactError::Manifest(error) }
}
impl From<IOError> for ArtifactError {
    fn from(error: IOError) -> Self { ArtifactError::IOError(error) }
}
