//! Diagram elements and the patches applied to them (§3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A polymorphic diagram element. Identity is by `id`; shape-specific
/// fields are kept opaque (`data`) since this core never interprets node
/// or edge geometry, only applies and forwards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: Uuid,
    #[serde(flatten)]
    pub data: CellData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellData {
    Node { fields: serde_json::Map<String, serde_json::Value> },
    Edge { fields: serde_json::Map<String, serde_json::Value> },
}

impl CellData {
    #[must_use]
    pub fn kind(&self) -> CellKind {
        match self {
            Self::Node { .. } => CellKind::Node,
            Self::Edge { .. } => CellKind::Edge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Node,
    Edge,
}

/// A single add/update/remove directed at one cell (§3, §4.G apply semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellOperation {
    pub id: Uuid,
    pub operation: CellOperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Cell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOperationKind {
    Add,
    Update,
    Remove,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CellOperationError {
    #[error("{0:?} operation requires data matching id {1}")]
    MissingOrMismatchedData(CellOperationKind, Uuid),
    #[error("remove operation must not carry data")]
    RemoveCarriesData,
}

impl CellOperation {
    /// §3: `add|update` requires `data` with `data.id == id`; `remove`
    /// forbids `data`.
    pub fn validate(&self) -> Result<(), CellOperationError> {
        match self.operation {
            CellOperationKind::Add | CellOperationKind::Update => match &self.data {
                Some(cell) if cell.id == self.id => Ok(()),
                _ => Err(CellOperationError::MissingOrMismatchedData(
                    self.operation,
                    self.id,
                )),
            },
            CellOperationKind::Remove => {
                if self.data.is_some() {
                    Err(CellOperationError::RemoveCarriesData)
                } else {
                    Ok(())
                }
            },
        }
    }
}

/// Collapse operations sharing `(id, operation, data)` to their first
/// occurrence, preserving order (§4.G deduplication).
#[must_use]
pub fn dedupe_operations(operations: Vec<CellOperation>) -> Vec<CellOperation> {
    let mut seen: Vec<(Uuid, CellOperationKind, Option<serde_json::Value>)> = Vec::new();
    let mut out = Vec::with_capacity(operations.len());

    for op in operations {
        let data_value = op.data.as_ref().map(|c| serde_json::to_value(c).unwrap_or_default());
        let key = (op.id, op.operation, data_value);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(op);
    }

    out
}

/// Closed set of reasons an operation can be rejected (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ValidationFailed,
    ConflictDetected,
    NoStateChange,
    DiagramNotFound,
    PermissionDenied,
    InvalidOperationType,
    EmptyOperation,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(id: Uuid) -> Cell {
        Cell {
            id,
            data: CellData::Node { fields: serde_json::Map::new() },
        }
    }

    #[test]
    fn add_requires_matching_data() {
        let id = Uuid::new_v4();
        let op = CellOperation { id, operation: CellOperationKind::Add, data: Some(cell(id)) };
        assert!(op.validate().is_ok());

        let mismatched =
            CellOperation { id, operation: CellOperationKind::Add, data: Some(cell(Uuid::new_v4())) };
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn remove_rejects_data() {
        let id = Uuid::new_v4();
        let op = CellOperation { id, operation: CellOperationKind::Remove, data: Some(cell(id)) };
        assert_eq!(op.validate(), Err(CellOperationError::RemoveCarriesData));
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let id = Uuid::new_v4();
        let ops: Vec<CellOperation> = (0..8)
            .map(|_| CellOperation { id, operation: CellOperationKind::Add, data: Some(cell(id)) })
            .collect();
        let deduped = dedupe_operations(ops);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn dedupe_preserves_distinct_entries() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ops = vec![
            CellOperation { id: a, operation: CellOperationKind::Add, data: Some(cell(a)) },
            CellOperation { id: b, operation: CellOperationKind::Add, data: Some(cell(b)) },
            CellOperation { id: a, operation: CellOperationKind::Add, data: Some(cell(a)) },
        ];
        let deduped = dedupe_operations(ops);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, a);
        assert_eq!(deduped[1].id, b);
    }
}
