use crate::resolver::{HierarchyResolver, ResolveOptions};
use placegraph_core::{ControlledField, ParentId, Record, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// What a rebuild is allowed to touch, derived from the controlled fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildAction {
    /// Resolve parent and ancestry.
    Full,
    /// Resolve ancestry, then put the prior ambiguous sentinel back.
    ///
    /// The sentinel is trusted rather than re-derived; this is a policy
    /// choice carried over from existing data, not a proven property.
    AncestryKeepingSentinel(ParentId),
    /// Parent is locked; only fill ancestry from ancestors.
    EnsureAncestry,
    /// Both fields are locked.
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeReport {
    pub action: RebuildAction,
    pub parent_changed: bool,
    pub ancestry_changed: bool,
}

impl ChangeReport {
    fn unchanged(action: RebuildAction) -> Self {
        Self {
            action,
            parent_changed: false,
            ancestry_changed: false,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.parent_changed || self.ancestry_changed
    }
}

/// Decides what to recompute for a record and whether anything moved.
#[derive(Clone)]
pub struct ChangeDetector {
    resolver: Arc<HierarchyResolver>,
}

impl ChangeDetector {
    pub fn new(resolver: Arc<HierarchyResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &HierarchyResolver {
        &self.resolver
    }

    pub fn plan(record: &Record) -> RebuildAction {
        let parent_locked = record.is_controlled(ControlledField::Parent);
        let ancestry_locked = record.is_controlled(ControlledField::Ancestry);
        let prior = record.parent_or_unresolved();

        match (parent_locked, ancestry_locked) {
            (true, true) => RebuildAction::Locked,
            (false, _) => RebuildAction::Full,
            (true, false) if prior.is_ambiguous() => RebuildAction::AncestryKeepingSentinel(prior),
            (true, false) => RebuildAction::EnsureAncestry,
        }
    }

    /// Recompute `record` in place and report whether parent or ancestry
    /// differ from what it carried before.
    pub async fn rebuild(&self, record: &mut Record, options: &ResolveOptions) -> Result<ChangeReport> {
        let prior_parent = record.parent_id;
        let prior_hierarchy = record.hierarchy.clone();
        let action = Self::plan(record);

        match action {
            RebuildAction::Locked => {
                warn!(
                    "not allowed to update parent or ancestry of {}, nothing to do",
                    record.id
                );
                return Ok(ChangeReport::unchanged(action));
            }
            RebuildAction::Full => {
                info!("append parent and ancestry for {}", record.id);
                self.resolver.resolve(record, options).await?;
            }
            RebuildAction::AncestryKeepingSentinel(sentinel) => {
                info!("append ancestry but not parent ({}) for {}", sentinel, record.id);
                self.resolver.resolve(record, options).await?;
                record.parent_id = Some(sentinel);
                self.resolver.backfill_always_present(record)?;
            }
            RebuildAction::EnsureAncestry => {
                info!("ensure ancestry for {}", record.id);
                self.resolver
                    .ensurer()
                    .ensure(record, &[], &options.filters)
                    .await?;
            }
        }

        if record.is_controlled(ControlledField::Parent) {
            record.parent_id = prior_parent;
        }
        if record.is_controlled(ControlledField::Ancestry) {
            record.hierarchy = prior_hierarchy.clone();
        }

        let parent_changed =
            prior_parent.unwrap_or(ParentId::Unresolved) != record.parent_or_unresolved();
        let ancestry_changed = prior_hierarchy != record.hierarchy;

        if parent_changed {
            warn!("parent ID has changed for {}", record.id);
        }
        if ancestry_changed {
            warn!("ancestry has changed for {}", record.id);
        }
        if !parent_changed && !ancestry_changed {
            info!("nothing changed when rebuilding the ancestry for {}", record.id);
        }

        Ok(ChangeReport {
            action,
            parent_changed,
            ancestry_changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placegraph_core::AncestryEntry;

    #[test]
    fn plan_follows_controlled_fields() {
        let open = Record::new(1, "venue", "v");
        assert_eq!(ChangeDetector::plan(&open), RebuildAction::Full);

        let ancestry_only = open.clone().with_controlled(ControlledField::Ancestry);
        assert_eq!(ChangeDetector::plan(&ancestry_only), RebuildAction::Full);

        let parent_locked = open
            .clone()
            .with_parent(ParentId::Resolved(9))
            .with_controlled(ControlledField::Parent);
        assert_eq!(
            ChangeDetector::plan(&parent_locked),
            RebuildAction::EnsureAncestry
        );

        let ambiguous = open
            .clone()
            .with_parent(ParentId::AmbiguousB)
            .with_controlled(ControlledField::Parent);
        assert_eq!(
            ChangeDetector::plan(&ambiguous),
            RebuildAction::AncestryKeepingSentinel(ParentId::AmbiguousB)
        );

        let locked = ambiguous
            .with_controlled(ControlledField::Ancestry)
            .with_hierarchy(vec![AncestryEntry::new()]);
        assert_eq!(ChangeDetector::plan(&locked), RebuildAction::Locked);
    }

    #[test]
    fn plain_controlled_names_are_honoured() {
        let mut record = Record::new(1, "venue", "v");
        record.controlled.insert("parent_id".to_string());
        record.controlled.insert("ancestry".to_string());
        assert_eq!(ChangeDetector::plan(&record), RebuildAction::Locked);
    }
}
