//! Commit: promote the staging object to the canonical merged stream.
//!
//! The promotion is two storage calls, delete then rename. A failure between
//! them leaves no canonical object at all; a failure before the delete leaves
//! the old stream next to an orphaned staging object. Nothing rolls back.
//!
//! Every step is conditioned on generations observed earlier:
//!
//! 1. the staging object must still be the one this attempt uploaded;
//! 2. the canonical object must still be at the generation the merge read;
//! 3. the delete only removes that generation;
//! 4. the rename only lands if nothing took the canonical name meanwhile.
//!
//! This is check-then-act, not compare-and-swap. Steps 3 and 4 are separate
//! calls, and while the canonical object is absent between them another
//! writer sees a first ingestion and may publish a stream without the old
//! records. This commit then fails with [`CommitError::Displaced`] and its
//! staging object, which holds the old records plus its batch, is left in
//! place.
use log::{debug, info, warn};
use storage::{ObjectHandle, ObjectStore, StorageError};
use thiserror::Error;

/// Errors that can occur while committing a merge.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The canonical object changed since the merge read it. Nothing was
    /// modified.
    #[error("merged stream changed during merge (expected generation {expected:?}, found {found:?})")]
    Conflict {
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// The staging object is gone or was replaced by someone else. Nothing
    /// was modified.
    #[error("staging object {name} is not ours any more (expected generation {expected}, found {found:?})")]
    StagingLost {
        name: String,
        expected: u64,
        found: Option<u64>,
    },

    /// The old stream was deleted, but another writer published a canonical
    /// object before the rename. The merge result survives as `staging`.
    #[error("another writer published the merged stream after its delete; merge result kept in {staging}")]
    Displaced { staging: String },

    /// A storage call failed. Storage is left as it was at that point.
    #[error("commit storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl CommitError {
    /// Returns `true` if storage was left untouched, so the merge can be
    /// redone against the current canonical object.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::StagingLost { .. })
    }
}

/// Replaces `container/canonical` with `container/staging`.
///
/// `staging_generation` is the generation the staging upload was published
/// with. `expected` is the canonical generation seen when the merge began,
/// `None` meaning the canonical object did not exist.
///
/// # Errors
///
/// [`CommitError::StagingLost`] or [`CommitError::Conflict`] if a check
/// fails before anything is modified, [`CommitError::Displaced`] if the
/// canonical name was taken between delete and rename,
/// [`CommitError::Storage`] if a storage call fails (including a staging
/// precondition failing after the delete).
pub fn commit(
    store: &dyn ObjectStore,
    container: &str,
    staging: &str,
    staging_generation: u64,
    canonical: &str,
    expected: Option<u64>,
) -> Result<ObjectHandle, CommitError> {
    let staged = store.generation(container, staging)?;
    if staged != Some(staging_generation) {
        return Err(CommitError::StagingLost {
            name: staging.to_string(),
            expected: staging_generation,
            found: staged,
        });
    }

    let found = store.generation(container, canonical)?;
    if found != expected {
        return Err(CommitError::Conflict { expected, found });
    }

    if let Some(generation) = found {
        match store.delete_if_generation(container, canonical, generation) {
            Ok(()) => debug!("deleted {}/{} (generation {})", container, canonical, generation),
            Err(StorageError::PreconditionFailed { found, .. }) => {
                return Err(CommitError::Conflict { expected, found });
            }
            Err(e) => return Err(e.into()),
        }
    }

    let handle = match store.rename_if_absent(container, staging, staging_generation, canonical) {
        Ok(handle) => handle,
        Err(StorageError::PreconditionFailed { ref name, found: taken, .. })
            if name == canonical && found.is_none() =>
        {
            // Nothing was deleted, so this is an ordinary lost race.
            return Err(CommitError::Conflict { expected, found: taken });
        }
        Err(StorageError::PreconditionFailed { ref name, found, .. }) if name == canonical => {
            warn!(
                "{}/{} reappeared (generation {:?}) after it was deleted; keeping {}",
                container, canonical, found, staging
            );
            return Err(CommitError::Displaced {
                staging: staging.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "committed {}/{} -> {} (generation {})",
        container, staging, handle.name, handle.generation
    );
    Ok(handle)
}
