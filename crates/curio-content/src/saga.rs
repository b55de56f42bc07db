//! Building blocks of the content-creation saga: viewer resolution, meta
//! fan-out and the compensation guard that undoes partial writes.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use curio_core::{
    BlobStore, ContentMetaRepository, ContentRepository, ContentType, Error, GroupResolver,
    Result, UserContentMeta,
};

use crate::service::{Created, ServiceContext, UploadContext};

/// Users allowed to see an upload.
///
/// A group upload through a group-capable channel is visible to the group's
/// members; anything else only to the uploader.
pub async fn resolve_authorized_users(
    groups: &dyn GroupResolver,
    ctx: &UploadContext,
) -> Result<Vec<Uuid>> {
    let Some(group_id) = ctx.effective_group() else {
        return Ok(vec![ctx.uploader]);
    };
    let members = groups.members(group_id).await?;
    if members.is_empty() {
        return Err(Error::InvalidInput(format!(
            "group {} has no members",
            group_id
        )));
    }
    debug!(group_id, member_count = members.len(), "Resolved group members");
    Ok(members)
}

/// Insert one meta row per (user × content id).
pub(crate) async fn insert_metas(
    metas: &dyn ContentMetaRepository,
    users: &[Uuid],
    content_ids: &[Uuid],
    content_type: ContentType,
) -> Result<()> {
    if content_ids.is_empty() {
        return Ok(());
    }
    let rows = UserContentMeta::fan_out(users, content_ids, content_type);
    metas.insert_many(&rows).await
}

// =============================================================================
// COMPENSATION
// =============================================================================

/// Compensating deletes for the writes tracked so far.
struct Rollback {
    contents: Arc<dyn ContentRepository>,
    metas: Arc<dyn ContentMetaRepository>,
    blobs: Arc<dyn BlobStore>,
    content_ids: Vec<Uuid>,
    object_key: Option<String>,
}

impl Rollback {
    fn is_empty(&self) -> bool {
        self.content_ids.is_empty() && self.object_key.is_none()
    }

    async fn run(self) {
        if !self.content_ids.is_empty() {
            if let Err(e) = self.metas.delete_for_contents(&self.content_ids).await {
                error!(error = %e, "Compensation failed to delete meta rows");
            }
            match self.contents.delete_many(&self.content_ids).await {
                Ok(removed) => debug!(removed, "Compensation deleted content records"),
                Err(e) => error!(error = %e, "Compensation failed to delete content records"),
            }
        }
        if let Some(key) = self.object_key {
            if let Err(e) = self.blobs.delete(&key).await {
                error!(object_key = %key, error = %e, "Compensation failed to delete blob");
            }
        }
    }
}

/// Tracks saga writes and undoes them unless committed.
///
/// Call [`commit`](Self::commit) once every step succeeded, or
/// [`rollback`](Self::rollback) on error. A guard dropped while still armed
/// (the create future was cancelled) spawns the rollback on the current
/// runtime.
pub struct Compensation {
    pending: Option<Rollback>,
}

impl Compensation {
    pub fn new(ctx: &ServiceContext) -> Self {
        Self {
            pending: Some(Rollback {
                contents: ctx.contents.clone(),
                metas: ctx.metas.clone(),
                blobs: ctx.blobs.clone(),
                content_ids: Vec::new(),
                object_key: None,
            }),
        }
    }

    pub fn track_contents(&mut self, ids: &[Uuid]) {
        if let Some(pending) = self.pending.as_mut() {
            pending.content_ids.extend_from_slice(ids);
        }
    }

    pub fn track_blob(&mut self, object_key: impl Into<String>) {
        if let Some(pending) = self.pending.as_mut() {
            pending.object_key = Some(object_key.into());
        }
    }

    /// Keep every tracked write.
    pub fn commit(mut self) {
        self.pending = None;
    }

    /// Undo every tracked write now.
    pub async fn rollback(mut self) {
        if let Some(pending) = self.pending.take() {
            pending.run().await;
        }
    }

    /// Commit on success, roll back on failure, and pass the result through.
    pub(crate) async fn settle(
        self,
        result: Result<Created>,
        content_type: ContentType,
    ) -> Result<Created> {
        match result {
            Ok(created) => {
                self.commit();
                info!(
                    content_type = %content_type,
                    result_count = created.ids.len(),
                    "Content created"
                );
                Ok(created)
            }
            Err(e) => {
                warn!(content_type = %content_type, error = %e, "Content creation failed, compensating");
                self.rollback().await;
                Err(e)
            }
        }
    }
}

impl Drop for Compensation {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Content creation cancelled, compensating in background");
                handle.spawn(pending.run());
            }
            Err(_) => error!(
                content_ids = ?pending.content_ids,
                object_key = ?pending.object_key,
                "Content creation cancelled outside a runtime, writes left behind"
            ),
        }
    }
}
