//! Three-way diff between remote and stored file maps

use std::collections::BTreeSet;

use crate::types::FileMap;

/// What a sync pass has to do, by filename
///
/// Every remote filename lands in exactly one of `to_upload` or `unchanged`;
/// `to_delete` holds the stored filenames the remote side no longer has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_upload: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
}

impl SyncPlan {
    /// Diff `remote` (fresh content fingerprints) against `store` (ETags)
    ///
    /// Matching is by filename first, then by fingerprint. Identical content
    /// under a new name is an upload plus a delete, not a rename.
    pub fn compute(remote: &FileMap, store: &FileMap) -> Self {
        let mut plan = SyncPlan::default();

        for (name, fingerprint) in remote {
            if needs_upload(store.get(name).map(String::as_str), fingerprint) {
                plan.to_upload.insert(name.clone());
            } else {
                plan.unchanged.insert(name.clone());
            }
        }

        plan.to_delete = store
            .keys()
            .filter(|name| !remote.contains_key(*name))
            .cloned()
            .collect();

        plan
    }

    /// True when the pass would not touch the store
    pub fn is_noop(&self) -> bool {
        self.to_upload.is_empty() && self.to_delete.is_empty()
    }
}

/// Whether a freshly fingerprinted file has to be written
pub fn needs_upload(stored: Option<&str>, fresh: &str) -> bool {
    match stored {
        Some(existing) => !existing.eq_ignore_ascii_case(fresh),
        None => true,
    }
}
