use std::fmt::Display;

use miette::miette;

/// Sub-reason attached to a [`Error::Validation`] rejection.
///
/// Each maps to a distinct user-facing message; the originating error is
/// preserved as the validation cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Live,
    NotYetPublished,
    StillPostProcessing,
    NoFormatsAvailable,
    Availability,
}

impl ValidationKind {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Live => "Cannot import a live stream",
            Self::NotYetPublished => "This video is not published yet",
            Self::StillPostProcessing => {
                "This video is still being processed by the remote platform"
            }
            Self::NoFormatsAvailable => "This video does not contain any downloadable format",
            Self::Availability => "This video is not available for import",
        }
    }
}

#[derive(Debug)]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub url: String,
    pub cause: Option<Box<Error>>,
}

#[derive(Debug)]
pub enum Error {
    /// The extraction subprocess could not be spawned
    Exec {
        url: String,
        source: std::io::Error,
    },

    /// The tool ran but exited with a non-zero status code.
    /// A `None` code means the process was terminated by a signal.
    RetCode { url: String, code: Option<i32> },

    /// The tool exited 0 but wrote to stderr.
    /// Stderr output is a strict crash signal here, not a warning channel.
    Crash { url: String, stderr: String },

    /// The tool succeeded but returned nothing usable
    NoInfo { url: String },

    /// The tool succeeded but the item exposes no video format
    NoFormats { url: String },

    /// The target is a live stream. This is a policy rejection,
    /// not a technical failure, and must not be retried.
    IsLive { url: String },

    /// A single-item import target failed higher-level validation
    Validation(ValidationError),

    Miette(miette::Report),
}

impl From<miette::Report> for Error {
    fn from(err: miette::Report) -> Self {
        Error::Miette(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Miette(miette::Report::msg(err.to_string()))
    }
}

impl From<Error> for miette::Report {
    fn from(err: Error) -> Self {
        match err {
            Error::Exec { url, source } => {
                miette!("Could not execute the extraction tool on '{url}': {source}")
            }
            Error::RetCode { url, code } => match code {
                Some(code) => miette!("Extraction tool exited with code {code} on '{url}'"),
                None => miette!("Extraction tool was terminated by a signal on '{url}'"),
            },
            Error::Crash { url, stderr } => {
                miette!("Extraction tool crashed on '{url}': {stderr}")
            }
            Error::NoInfo { url } => miette!("No information could be extracted from '{url}'"),
            Error::NoFormats { url } => miette!("No video format available for '{url}'"),
            Error::IsLive { url } => miette!("'{url}' is a live stream and cannot be imported"),
            Error::Validation(err) => {
                let msg = format!("{} ('{}')", err.kind.user_message(), err.url);
                match err.cause {
                    Some(cause) => miette::Report::from(*cause).wrap_err(msg),
                    None => miette!("{msg}"),
                }
            }
            Error::Miette(err) => err,
        }
    }
}

impl Error {
    pub fn wrap_err_with<D, F>(self, f: F) -> Error
    where
        D: Display + Send + Sync + 'static,
        F: FnOnce() -> D,
    {
        match self {
            Error::Miette(report) => Error::Miette(report.wrap_err(f())),
            err => err,
        }
    }
}

pub fn err_msg<D: Display + Send + Sync + 'static>(msg: D) -> Error {
    Error::Miette(miette!("{msg}"))
}

pub type Result<T> = std::result::Result<T, Error>;
