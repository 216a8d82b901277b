use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

type Cause = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed input, detected before the engine is contacted.
    Validation,
    /// The engine failed to load.
    Initialization,
    /// Language or theme not in the engine's supported sets.
    UnsupportedOption,
    /// The engine rejected (or did not finish) a render call.
    Render,
}

impl AsRef<str> for ErrorKind {
    fn as_ref(&self) -> &str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Initialization => "initialization",
            ErrorKind::UnsupportedOption => "unsupported-option",
            ErrorKind::Render => "render",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        self.as_ref().fmt(out)
    }
}

/// An error from highlighting, with a kind tag for programmatic use.
///
/// The display form is flattened to a single line, prefixed by the
/// operation that failed (if known) and followed by the cause (if any).
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    during: Option<&'static str>,
    cause: Option<Cause>,
}

impl Error {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            during: None,
            cause: None,
        }
    }
    pub fn validation(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, message)
    }
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::UnsupportedOption, message)
    }
    pub fn init(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Initialization, message)
    }
    pub fn render(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Render, message)
    }

    /// Attach the underlying cause.
    pub fn caused_by(mut self, cause: anyhow::Error) -> Self {
        let cause: Box<dyn StdError + Send + Sync> = cause.into();
        self.cause = Some(cause.into());
        self
    }

    /// Name the operation that failed.
    ///
    /// An error that already names an operation keeps the innermost one.
    pub fn during(mut self, operation: &'static str) -> Self {
        self.during.get_or_insert(operation);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        if let Some(operation) = self.during {
            write!(out, "{operation} failed: ")?;
        }
        out.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(out, ": {cause}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut out = s.serialize_struct("Error", 2)?;
        out.serialize_field("kind", self.kind.as_ref())?;
        out.serialize_field("message", &self.to_string())?;
        out.end()
    }
}
