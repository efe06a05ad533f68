use relay_core::types::Mapping;

use crate::driver::{BoundParam, Row};
use crate::error::RunError;

/// Mappings resolved against the source result's column list.
///
/// Built once per run from the first row's columns; every later row of the
/// same result shares them, so binding is an index lookup per parameter.
#[derive(Debug, Clone)]
pub struct MappingPlan {
    slots: Vec<Slot>,
}

#[derive(Debug, Clone)]
struct Slot {
    column: usize,
    parameter: String,
}

impl MappingPlan {
    /// Resolve each mapping's source column, exact match first and then ASCII
    /// case-insensitive. Unmapped columns are ignored; a mapping whose column
    /// is missing fails the whole run.
    pub fn resolve(mappings: &[Mapping], columns: &[String]) -> Result<Self, RunError> {
        let slots = mappings
            .iter()
            .map(|m| {
                let column = columns
                    .iter()
                    .position(|c| *c == m.source_column)
                    .or_else(|| {
                        columns
                            .iter()
                            .position(|c| c.eq_ignore_ascii_case(&m.source_column))
                    })
                    .ok_or_else(|| RunError::Mapping {
                        column: m.source_column.clone(),
                        available: columns.to_vec(),
                    })?;
                Ok(Slot {
                    column,
                    parameter: m.target_parameter.clone(),
                })
            })
            .collect::<Result<Vec<_>, RunError>>()?;
        Ok(Self { slots })
    }

    /// Parameter set for one row, in mapping order.
    pub fn bind(&self, row: &Row) -> Result<Vec<BoundParam>, RunError> {
        self.slots
            .iter()
            .map(|slot| {
                let value = row.get(slot.column).cloned().ok_or_else(|| RunError::Mapping {
                    column: slot.parameter.clone(),
                    available: row.columns().to_vec(),
                })?;
                Ok(BoundParam {
                    name: slot.parameter.clone(),
                    value,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::SqlValue;

    fn mapping(col: &str, param: &str, position: u32) -> Mapping {
        Mapping {
            id: format!("m{position}"),
            integration_id: "i1".into(),
            source_column: col.into(),
            target_parameter: param.into(),
            position,
        }
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn binds_in_mapping_order_and_ignores_unmapped() {
        let cols = columns(&["id", "name", "extra"]);
        let plan = MappingPlan::resolve(
            &[mapping("name", "@n", 0), mapping("id", "@i", 1)],
            &cols,
        )
        .unwrap();
        let row = Row::new(
            Arc::from(cols),
            vec![
                SqlValue::Integer(7),
                SqlValue::Text("seven".into()),
                SqlValue::Null,
            ],
        );
        let params = plan.bind(&row).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "@n");
        assert_eq!(params[0].value, SqlValue::Text("seven".into()));
        assert_eq!(params[1].value, SqlValue::Integer(7));
    }

    #[test]
    fn falls_back_to_case_insensitive_match() {
        let plan = MappingPlan::resolve(&[mapping("COL_A", "@p1", 0)], &columns(&["col_a"])).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn exact_match_wins_over_case_insensitive() {
        let cols = columns(&["Col", "col"]);
        let plan = MappingPlan::resolve(&[mapping("col", "@p", 0)], &cols).unwrap();
        let row = Row::new(
            Arc::from(cols),
            vec![SqlValue::Integer(1), SqlValue::Integer(2)],
        );
        assert_eq!(plan.bind(&row).unwrap()[0].value, SqlValue::Integer(2));
    }

    #[test]
    fn missing_column_is_a_mapping_error() {
        let err = MappingPlan::resolve(&[mapping("col_missing", "@p1", 0)], &columns(&["col_a"]))
            .unwrap_err();
        match err {
            RunError::Mapping { column, available } => {
                assert_eq!(column, "col_missing");
                assert_eq!(available, vec!["col_a".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
