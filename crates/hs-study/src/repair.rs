//! Excision of trials left broken by workers killed mid-trial.

use hs_types::{HsResult, StudyMeta};
use tracing::{info, warn};

use crate::store::StudyStore;

/// Remove corrupt trials from a study: those killed before their
/// most-advanced reporting step received a value. Replaying such trials
/// into a sampler's model poisons it with nulls, so they are excised by
/// deleting the persisted study and rebuilding it from the usable trials,
/// in their original relative order.
///
/// Returns the (possibly recreated) study metadata and the removed trial
/// numbers, reported 1-based for the operator log.
///
/// Precondition: no other worker is attached to this storage identity
/// while repair runs. The store provides no cross-operation transaction,
/// so this is the caller's guarantee to make, not something enforced here.
pub fn repair_study(
    store: &dyn StudyStore,
    meta: &StudyMeta,
) -> HsResult<(StudyMeta, Vec<u64>)> {
    let trials = store.list_trials(&meta.id)?;
    if trials.is_empty() {
        return Ok((meta.clone(), Vec::new()));
    }

    let (usable, corrupt): (Vec<_>, Vec<_>) = trials.into_iter().partition(|t| t.is_usable());
    if corrupt.is_empty() {
        info!("All {} trials of {} check out", usable.len(), meta.id);
        return Ok((meta.clone(), Vec::new()));
    }

    let removed: Vec<u64> = corrupt.iter().map(|t| t.number + 1).collect();
    warn!(
        "Removing {} broken trial(s) {:?} from {}",
        removed.len(),
        removed,
        meta.id
    );

    store.delete_study(&meta.id)?;
    let fresh = store.create_study(meta.clone())?;
    for trial in usable {
        store.append_trial(&fresh.id, trial)?;
    }

    Ok((fresh, removed))
}
