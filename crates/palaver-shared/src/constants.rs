//! Well-known tree roots and application limits.

/// Root of all user records: `users/{uid}`.
pub const USERS_ROOT: &str = "users";

/// Lowercased username -> uid references written at signup.
pub const USERNAMES_ROOT: &str = "usernames";

/// Symmetric friend edges: `friends/{ownerId}/{otherId}`.
pub const FRIENDS_ROOT: &str = "friends";

/// Directed pending requests: `friendRequests/{recipientId}/{requesterId}`.
pub const FRIEND_REQUESTS_ROOT: &str = "friendRequests";

/// Conversation records: `chats/{chatId}`.
pub const CHATS_ROOT: &str = "chats";

/// Per-user conversation directory: `userChats/{uid}/{chatId}`.
pub const USER_CHATS_ROOT: &str = "userChats";

/// Separator between the two ordered participant ids in a [`ChatId`].
/// Must never appear inside a [`UserId`].
///
/// [`ChatId`]: crate::types::ChatId
/// [`UserId`]: crate::types::UserId
pub const CHAT_ID_SEPARATOR: char = '_';

/// How many trailing messages a conversation watch replays.
pub const MESSAGE_HISTORY_LIMIT: usize = 100;

/// Search terms shorter than this return no results (not an error).
pub const MIN_SEARCH_TERM_LEN: usize = 2;

/// Minimum username length accepted at signup.
pub const MIN_USERNAME_LEN: usize = 3;

/// Minimum password length accepted at signup / password change.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Profile picture size cap (5 MiB).
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
