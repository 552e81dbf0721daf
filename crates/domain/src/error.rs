use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0} must not be blank")]
    BlankIdentifier(&'static str),

    #[error("identifier contains whitespace: {0:?}")]
    InvalidIdentifier(String),

    #[error("contribution has no full name")]
    MissingFullName,

    #[error("reply body must not be empty")]
    EmptyBody,

    #[error("unknown reply state: {0}")]
    UnknownState(String),
}
