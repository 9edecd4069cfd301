use thiserror::Error;

/// Errors produced when constructing or parsing domain identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A user identifier was empty.
    #[error("user id must not be empty")]
    EmptyUserId,

    /// A user identifier contained the chat-id separator.
    #[error("user id must not contain '{0}'")]
    ReservedCharacter(char),

    /// A chat id did not have the `{a}_{b}` shape.
    #[error("malformed chat id: {0}")]
    MalformedChatId(String),
}
