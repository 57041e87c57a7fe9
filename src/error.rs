use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable category of a conversion failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    MalformedSource,
    Render,
    EngineNotFound,
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid DOCX: {0}")]
    InvalidDocx(String),

    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("Invalid text encoding: {0}")]
    Encoding(String),

    #[error("Invalid CSS: {0}")]
    InvalidCss(String),

    #[error("Content overflows the page by {0:.1}pt")]
    Overflow(f32),

    #[error("Document engine not found: {0} (install LibreOffice or choose the builtin engine)")]
    EngineNotFound(String),

    #[error("Document engine failed: {0}")]
    Engine(String),

    #[error("PDF output error: {0}")]
    Pdf(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::InvalidDocx(_) | Error::InvalidPdf(_) | Error::Encoding(_) => {
                ErrorKind::MalformedSource
            }
            Error::InvalidCss(_)
            | Error::Overflow(_)
            | Error::Engine(_)
            | Error::Pdf(_) => ErrorKind::Render,
            Error::EngineNotFound(_) => ErrorKind::EngineNotFound,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::InvalidDocx(other.to_string()),
        }
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::InvalidDocx(format!("XML parse error: {e}"))
    }
}

impl From<lopdf::Error> for Error {
    fn from(e: lopdf::Error) -> Self {
        match e {
            lopdf::Error::IO(io) => Error::Io(io),
            other => Error::InvalidPdf(other.to_string()),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => Error::Io(io),
            other => Error::Pdf(format!("image encoding failed: {other}")),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Error::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::UnsupportedFormat(".odt".into()).kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(Error::InvalidDocx("x".into()).kind(), ErrorKind::MalformedSource);
        assert_eq!(Error::InvalidCss("x".into()).kind(), ErrorKind::Render);
        assert_eq!(Error::Overflow(3.0).kind(), ErrorKind::Render);
        assert_eq!(Error::EngineNotFound("soffice".into()).kind(), ErrorKind::EngineNotFound);
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(Error::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn engine_not_found_message_names_condition() {
        let msg = Error::EngineNotFound("soffice".into()).to_string();
        assert!(msg.contains("engine not found"));
        assert!(msg.contains("soffice"));
    }
}
