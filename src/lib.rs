pub mod allocator;
pub mod config;
pub mod error;
pub mod git;
pub mod graph;
pub mod grapher;
pub mod layout;
pub mod options;
pub mod revision;
pub mod source;

pub use allocator::{ColorToken, ColumnAllocator, GraphLine, GraphNode};
pub use error::{GraphError, SourceError};
pub use graph::{IncrementalGraph, Progress};
pub use grapher::{GraphStep, Grapher, NodeExtra};
pub use layout::{LayoutEmitter, Palette, RenderGeometry, Rgb, Segment};
pub use options::{GraphOptions, TraversalKind, TraversalMode};
pub use revision::{BranchId, Parents, Revision, SnapshotToken};
pub use source::{MemoryStore, RevisionSource};
