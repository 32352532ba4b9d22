use std::fmt;

/// Failure class, used to decide whether an error is local to one unit or
/// moves a workflow into an explicit failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Other,
    Load,
    Discovery,
    ValidationService,
    BuildService,
    UserInput,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::Other, msg)
    }

    pub fn with_kind<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn load<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::Load, msg)
    }

    pub fn discovery<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::Discovery, msg)
    }

    pub fn validation_service<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::ValidationService, msg)
    }

    pub fn build_service<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::BuildService, msg)
    }

    pub fn user_input<M: Into<String>>(msg: M) -> Self {
        Self::with_kind(ErrorKind::UserInput, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
