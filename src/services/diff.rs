use std::collections::BTreeSet;

/// What a sync run must add: `to_add = target_ids \ already_present_ids`.
///
/// Sets are ordered so batches come out the same on every run. Removals are
/// never computed; sync only ever adds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    pub target_ids: BTreeSet<String>,
    pub already_present_ids: BTreeSet<String>,
    pub to_add: BTreeSet<String>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty()
    }
}

pub fn diff<T, C>(target_ids: T, current_ids: C) -> SyncDiff
where
    T: IntoIterator<Item = String>,
    C: IntoIterator<Item = String>,
{
    let target_ids: BTreeSet<String> = target_ids.into_iter().collect();
    let already_present_ids: BTreeSet<String> = current_ids.into_iter().collect();
    let to_add = target_ids
        .difference(&already_present_ids)
        .cloned()
        .collect();

    SyncDiff {
        target_ids,
        already_present_ids,
        to_add,
    }
}
