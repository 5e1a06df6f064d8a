//! Ordered DDL output.

use serde::Serialize;

/// Execution phase of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Index and foreign-key drops.
    DropIndices,
    /// Table, generator and column changes.
    Tables,
    /// Index and foreign-key creation.
    CreateIndices,
}

/// One rendered statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdlStatement {
    pub phase: Phase,
    /// Item the statement belongs to.
    pub item_id: i64,
    pub sql: String,
}

/// Statements grouped by phase, plus notes for changes that need manual
/// action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DdlScript {
    drop_indices: Vec<DdlStatement>,
    tables: Vec<DdlStatement>,
    create_indices: Vec<DdlStatement>,
    notes: Vec<String>,
}

impl DdlScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement to its phase.
    pub fn push(&mut self, phase: Phase, item_id: i64, sql: impl Into<String>) {
        let statement = DdlStatement {
            phase,
            item_id,
            sql: sql.into(),
        };
        match phase {
            Phase::DropIndices => self.drop_indices.push(statement),
            Phase::Tables => self.tables.push(statement),
            Phase::CreateIndices => self.create_indices.push(statement),
        }
    }

    /// Record a change the synthesizer does not perform.
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    /// All statements in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &DdlStatement> {
        self.drop_indices
            .iter()
            .chain(self.tables.iter())
            .chain(self.create_indices.iter())
    }

    /// Statement texts in execution order.
    pub fn sql(&self) -> Vec<&str> {
        self.statements().map(|s| s.sql.as_str()).collect()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.drop_indices.len() + self.tables.len() + self.create_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_independent_of_push_order() {
        let mut script = DdlScript::new();
        script.push(Phase::CreateIndices, 1, "CREATE INDEX");
        script.push(Phase::Tables, 1, "ALTER TABLE");
        script.push(Phase::DropIndices, 1, "DROP INDEX");
        script.push(Phase::Tables, 2, "CREATE TABLE");

        assert_eq!(
            script.sql(),
            ["DROP INDEX", "ALTER TABLE", "CREATE TABLE", "CREATE INDEX"]
        );
        assert_eq!(script.len(), 4);
    }
}
