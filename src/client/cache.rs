use crate::models::{
    comment::{CommentPage, MainComment},
    websocket::FanOutEvent,
};

/// What `apply_event` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    /// Already cached under the same id.
    Duplicate,
    /// A reply whose main comment is not on a loaded page.
    Orphaned,
}

/// The subset of a blog's thread a viewer currently holds. Not
/// authoritative: a wholesale reload replaces it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentCache {
    pub comments: Vec<MainComment>,
    /// Main comments on the server, as of the last page plus live inserts.
    pub total: u64,
    /// Last page loaded, 0 before the first load.
    pub page: usize,
    pub limit: usize,
}

impl CommentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything and keeps only `page`.
    pub fn replace(&mut self, page: CommentPage) {
        self.total = page.pagination.total;
        self.page = page.pagination.page;
        self.limit = page.pagination.limit;
        self.comments = page.comments;
    }

    /// Appends a later page. Comments already cached are skipped: live
    /// inserts shift the server's pages, so page boundaries overlap.
    pub fn append_page(&mut self, page: CommentPage) -> usize {
        self.total = page.pagination.total;
        self.page = self.page.max(page.pagination.page);
        self.limit = page.pagination.limit;

        let mut appended = 0;
        for comment in page.comments {
            if self.find(&comment.id).is_none() {
                self.comments.push(comment);
                appended += 1;
            }
        }
        appended
    }

    pub fn has_more(&self) -> bool {
        (self.comments.len() as u64) < self.total
    }

    pub fn find(&self, comment_id: &str) -> Option<&MainComment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

/// Merges one pushed comment into the cache.
///
/// New main comments go to the top in arrival order, without re-sorting by
/// `created_at`. New replies go to the top of their thread. Events already
/// present by id are ignored, so an author's own echo never doubles a row.
pub fn apply_event(cache: &mut CommentCache, event: &FanOutEvent) -> MergeOutcome {
    match event {
        FanOutEvent::Main(comment) => {
            if cache.find(&comment.id).is_some() {
                return MergeOutcome::Duplicate;
            }
            cache.comments.insert(0, comment.clone());
            cache.total += 1;
            MergeOutcome::Inserted
        }
        FanOutEvent::Reply(reply) => {
            let Some(parent) = cache
                .comments
                .iter_mut()
                .find(|c| c.id == reply.parent_comment_id)
            else {
                return MergeOutcome::Orphaned;
            };

            if parent.replies.iter().any(|r| r.id == reply.id) {
                return MergeOutcome::Duplicate;
            }
            parent.replies.insert(0, reply.clone());
            MergeOutcome::Inserted
        }
    }
}
