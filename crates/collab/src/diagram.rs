//! Diagram cell state and operation application (§3, §4.G "Apply semantics").

use tmi_protocol::{Cell, CellOperation, CellOperationKind, RejectionReason};
use uuid::Uuid;

/// Outcome of applying a batch of operations to a diagram's cell set.
pub enum ApplyOutcome {
    /// At least one cell changed; the diagram now reflects `cells`.
    Applied { cells: Vec<Cell> },
    /// Every operation was a no-op against current state (e.g. re-sent an
    /// already-applied remove). Nothing is broadcast.
    NoChange,
    /// An operation conflicted with current state (add of an existing id,
    /// update/remove of a missing one).
    Conflict { reason: RejectionReason, affected_cells: Vec<Uuid> },
}

/// In-memory diagram cell set owned by a `Session`.
#[derive(Debug, Clone, Default)]
pub struct Diagram {
    cells: Vec<Cell>,
}

impl Diagram {
    #[must_use]
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Apply deduplicated operations on a snapshot, per §4.G: `add` fails if
    /// present, `update`/`remove` fail if absent. The whole batch is applied
    /// atomically against the snapshot — a single conflicting operation
    /// rejects the entire batch rather than partially applying.
    pub fn apply(&mut self, operations: &[CellOperation]) -> ApplyOutcome {
        let mut working = self.cells.clone();
        let mut changed = false;

        for op in operations {
            match op.operation {
                CellOperationKind::Add => {
                    if working.iter().any(|c| c.id == op.id) {
                        return ApplyOutcome::Conflict {
                            reason: RejectionReason::ConflictDetected,
                            affected_cells: vec![op.id],
                        };
                    }
                    #[allow(clippy::expect_used)]
                    let cell = op.data.clone().expect("validated add carries data");
                    working.push(cell);
                    changed = true;
                }
                CellOperationKind::Update => {
                    let Some(idx) = working.iter().position(|c| c.id == op.id) else {
                        return ApplyOutcome::Conflict {
                            reason: RejectionReason::ConflictDetected,
                            affected_cells: vec![op.id],
                        };
                    };
                    #[allow(clippy::expect_used)]
                    let cell = op.data.clone().expect("validated update carries data");
                    if working[idx].data != cell.data {
                        working[idx] = cell;
                        changed = true;
                    }
                }
                CellOperationKind::Remove => {
                    let Some(idx) = working.iter().position(|c| c.id == op.id) else {
                        return ApplyOutcome::Conflict {
                            reason: RejectionReason::ConflictDetected,
                            affected_cells: vec![op.id],
                        };
                    };
                    working.remove(idx);
                    changed = true;
                }
            }
        }

        if !changed {
            return ApplyOutcome::NoChange;
        }
        self.cells = working.clone();
        ApplyOutcome::Applied { cells: working }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tmi_protocol::CellData;

    fn node(id: Uuid) -> Cell {
        Cell { id, data: CellData::Node { fields: serde_json::Map::new() } }
    }

    #[test]
    fn add_conflicts_on_existing_id() {
        let id = Uuid::new_v4();
        let mut diagram = Diagram::new(vec![node(id)]);
        let op = CellOperation { id, operation: CellOperationKind::Add, data: Some(node(id)) };
        assert!(matches!(diagram.apply(&[op]), ApplyOutcome::Conflict { .. }));
    }

    #[test]
    fn update_conflicts_on_missing_id() {
        let id = Uuid::new_v4();
        let mut diagram = Diagram::new(vec![]);
        let op = CellOperation { id, operation: CellOperationKind::Update, data: Some(node(id)) };
        assert!(matches!(diagram.apply(&[op]), ApplyOutcome::Conflict { .. }));
    }

    #[test]
    fn remove_is_no_change_when_reapplied() {
        let id = Uuid::new_v4();
        let mut diagram = Diagram::new(vec![node(id)]);
        let op = CellOperation { id, operation: CellOperationKind::Remove, data: None };
        assert!(matches!(diagram.apply(&[op.clone()]), ApplyOutcome::Applied { .. }));
        // id no longer present; removing again is a conflict, not a no-op,
        // per §4.G ("remove: fails if id absent => conflict").
        assert!(matches!(diagram.apply(&[op]), ApplyOutcome::Conflict { .. }));
    }

    #[test]
    fn update_with_identical_data_is_no_change() {
        let id = Uuid::new_v4();
        let mut diagram = Diagram::new(vec![node(id)]);
        let op = CellOperation { id, operation: CellOperationKind::Update, data: Some(node(id)) };
        assert!(matches!(diagram.apply(&[op]), ApplyOutcome::NoChange));
    }

    proptest! {
        /// Adding any number of distinct fresh ids always grows the diagram
        /// by exactly that many cells, whatever the starting cell count.
        #[test]
        fn applying_n_distinct_adds_grows_diagram_by_n(starting in 0u8..8, additions in 1u8..8) {
            let mut diagram = Diagram::new((0..starting).map(|_| node(Uuid::new_v4())).collect());
            let before = diagram.cells().len();

            let ops: Vec<CellOperation> = (0..additions)
                .map(|_| {
                    let id = Uuid::new_v4();
                    CellOperation { id, operation: CellOperationKind::Add, data: Some(node(id)) }
                })
                .collect();

            let outcome = diagram.apply(&ops);
            let ApplyOutcome::Applied { cells } = outcome else {
                panic!("fresh distinct ids must always apply cleanly");
            };
            prop_assert_eq!(cells.len(), before + additions as usize);
            prop_assert_eq!(diagram.cells().len(), before + additions as usize);
        }
    }
}
