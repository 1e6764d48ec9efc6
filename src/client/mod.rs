//! Viewer-side synchronisation of a blog's comment thread.

pub mod api;
pub mod cache;
pub mod channel;
pub mod sync;

pub use api::{CommentApi, HttpCommentApi};
pub use cache::{apply_event, CommentCache, MergeOutcome};
pub use channel::{ChannelLink, ChannelSignal, WsChannel};
pub use sync::{SyncClient, SyncHandle, SyncOptions, SyncSnapshot, SyncState};
