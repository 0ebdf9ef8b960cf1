//! The provenance-tracker collaborator contract (`SPEC_FULL.md` §6).
//!
//! The core never depends on a tracker being present — it only calls one
//! if the caller supplies it — but when present, it must be called on
//! *every* structural change so the reverse-chain stays complete.

use crate::ir::NodeId;

/// Where a node was created, for external provenance/debugging tools.
#[derive(Debug, Clone)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

/// Sink for structural-change events. [`crate::ir::GraphBuilder`] calls
/// `track_created` from each node constructor; [`crate::optimizer::Optimizer`]
/// calls `track_transformation` from every rewrite.
pub trait ProvenanceSink {
    fn track_created(&mut self, node: NodeId, source: Option<SourceLoc>);
    fn track_transformation(
        &mut self,
        result: NodeId,
        pass: &str,
        originals: &[NodeId],
        description: &str,
    );
}

/// An in-memory sink useful for tests and for simple external tooling
/// that just wants the full event log.
#[derive(Debug, Default)]
pub struct RecordingProvenance {
    pub created: Vec<(NodeId, Option<SourceLoc>)>,
    pub transformations: Vec<(NodeId, String, Vec<NodeId>, String)>,
}

impl ProvenanceSink for RecordingProvenance {
    fn track_created(&mut self, node: NodeId, source: Option<SourceLoc>) {
        self.created.push((node, source));
    }

    fn track_transformation(
        &mut self,
        result: NodeId,
        pass: &str,
        originals: &[NodeId],
        description: &str,
    ) {
        self.transformations.push((
            result,
            pass.to_string(),
            originals.to_vec(),
            description.to_string(),
        ));
    }
}
