/// Tally vote service: one vote per user per post or comment, with
/// denormalized upvote/downvote counters kept in step with the ledger.
///
/// - `service`: cast, retract, and query votes; reconcile counters
/// - `directory`: the existence check for posts and comments
/// - `retry`: bounded retry for transient storage errors

pub mod directory;
pub mod error;
pub mod retry;
pub mod service;

pub use directory::EntityDirectory;
pub use error::VoteError;
pub use retry::retry_transient;
pub use service::VoteService;
