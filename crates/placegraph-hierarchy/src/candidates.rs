//! Turning one level's containment candidates into parent + ancestry.

use placegraph_core::{AmbiguityClass, AncestryEntry, ParentId, Placetype, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidatePolicy {
    /// Write the parent field as well as the ancestry.
    pub assign_parent: bool,
    /// Ask the caller to run the ancestor search when this level leaves the
    /// record without a usable lineage.
    pub ensure_fallback: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateOutcome {
    pub found: bool,
    pub wants_fallback: bool,
}

/// Parent value for a record with several plausible parents at one level.
pub fn ambiguous_parent(placetype: &Placetype) -> ParentId {
    match placetype.ambiguity_class() {
        Some(AmbiguityClass::A) => ParentId::AmbiguousA,
        Some(AmbiguityClass::B) => ParentId::AmbiguousB,
        None => ParentId::Unresolved,
    }
}

/// Apply `candidates` (all of a single place-type) to `record`.
///
/// Candidate ancestry is copied, never aliased.
pub fn apply_candidates(
    record: &mut Record,
    candidates: &[Record],
    policy: CandidatePolicy,
) -> CandidateOutcome {
    let own = record.placetype.clone();
    let own_id = record.id;
    let with_self = |entry: &AncestryEntry| entry.clone().with(&own, own_id);

    match candidates {
        [] => {
            record.hierarchy = Vec::new();
            if policy.assign_parent {
                record.parent_id = Some(ParentId::Unresolved);
            }
            CandidateOutcome {
                found: false,
                wants_fallback: policy.ensure_fallback,
            }
        }
        [parent] => {
            record.hierarchy = parent.hierarchy.iter().map(with_self).collect();
            if policy.assign_parent {
                record.parent_id = Some(ParentId::Resolved(parent.id));
            }
            let orphaned = parent.parent_or_unresolved() == ParentId::Unresolved;
            CandidateOutcome {
                found: true,
                wants_fallback: orphaned && policy.ensure_fallback,
            }
        }
        many => {
            let mut union: Vec<AncestryEntry> = Vec::new();
            for entry in many.iter().flat_map(|c| c.hierarchy.iter()).map(with_self) {
                if !union.contains(&entry) {
                    union.push(entry);
                }
            }
            record.hierarchy = union;
            if policy.assign_parent {
                record.parent_id = Some(ambiguous_parent(&own));
            }
            CandidateOutcome {
                found: true,
                wants_fallback: false,
            }
        }
    }
}
