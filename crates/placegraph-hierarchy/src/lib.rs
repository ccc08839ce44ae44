pub mod apply;
pub mod candidates;
pub mod cascade;
pub mod change;
pub mod ensure;
pub mod memory;
pub mod propagator;
pub mod resolver;

pub use apply::{repository_label, ApplyUpdate, DryRunUpdate, PersistAndReindex, TouchedRepos};
pub use candidates::{ambiguous_parent, apply_candidates, CandidateOutcome, CandidatePolicy};
pub use cascade::{paginate, CascadeOptions, CascadeRebuilder};
pub use change::{ChangeDetector, ChangeReport, RebuildAction};
pub use ensure::AncestorEnsurer;
pub use memory::{BBox, MemoryFeatureStore, MemorySpatialIndex};
pub use propagator::{PropagateFlags, PropagationReport, UpdatePropagator};
pub use resolver::{HierarchyResolver, ResolveOptions};
