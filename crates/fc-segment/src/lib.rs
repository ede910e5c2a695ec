//! Translates a segment predicate tree (§4.5) into a parameterized SQL
//! `WHERE` fragment over the `users` table (`consent_state` as a
//! first-class column, `attributes` as a JSON blob column queried via
//! `json_extract`). Kept free of any database dependency so the
//! compilation logic is unit-testable without a connection — the Storage
//! Gateway (`fc-storage`) is the only crate that actually executes the
//! resulting SQL.

use fc_common::{Logic, Operator, SegmentPredicate};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("unknown segment operator in predicate")]
    UnknownOperator,

    #[error("empty composite predicate")]
    EmptyComposite,
}

pub type Result<T> = std::result::Result<T, SegmentError>;

/// A compiled `WHERE` fragment plus its positional bind parameters, in the
/// order `?` placeholders appear in `clause`.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    pub clause: String,
    pub params: Vec<String>,
}

const FIRST_CLASS_COLUMNS: &[&str] = &["consent_state"];

/// Compile a segment predicate into a SQL fragment. `None` means "all Users
/// with `consent_state = OPT_IN`" per §4.5.
pub fn compile(predicate: Option<&SegmentPredicate>) -> Result<CompiledPredicate> {
    match predicate {
        None => Ok(CompiledPredicate {
            clause: "consent_state = ?".to_string(),
            params: vec!["OPT_IN".to_string()],
        }),
        Some(p) => compile_node(p),
    }
}

fn compile_node(predicate: &SegmentPredicate) -> Result<CompiledPredicate> {
    match predicate {
        SegmentPredicate::Leaf {
            attribute,
            operator,
            value,
        } => compile_leaf(attribute, *operator, value),
        SegmentPredicate::Composite { conditions, logic } => compile_composite(conditions, *logic),
    }
}

fn compile_leaf(attribute: &str, operator: Operator, value: &str) -> Result<CompiledPredicate> {
    let column_expr = if FIRST_CLASS_COLUMNS.contains(&attribute) {
        attribute.to_string()
    } else {
        format!("json_extract(attributes, '$.{}')", sanitize_attribute(attribute))
    };

    let (clause, params) = match operator {
        Operator::Equals => (format!("{column_expr} = ?"), vec![value.to_string()]),
        Operator::Contains => (
            format!("{column_expr} LIKE ?"),
            vec![format!("%{}%", escape_like(value))],
        ),
    };

    Ok(CompiledPredicate { clause, params })
}

fn compile_composite(conditions: &[SegmentPredicate], logic: Logic) -> Result<CompiledPredicate> {
    if conditions.is_empty() {
        return Err(SegmentError::EmptyComposite);
    }

    let joiner = match logic {
        Logic::And => " AND ",
        Logic::Or => " OR ",
    };

    let mut clauses = Vec::with_capacity(conditions.len());
    let mut params = Vec::new();

    for condition in conditions {
        let compiled = compile_node(condition)?;
        clauses.push(format!("({})", compiled.clause));
        params.extend(compiled.params);
    }

    Ok(CompiledPredicate {
        clause: clauses.join(joiner),
        params,
    })
}

/// JSON path segments can't contain the characters that would let an
/// attacker escape the `$.` path syntax; strip anything but word
/// characters defensively since attribute names are operator-supplied.
fn sanitize_attribute(attribute: &str) -> String {
    attribute
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn escape_like(value: &str) -> String {
    value.replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::{Logic, Operator, SegmentPredicate};

    #[test]
    fn absent_segment_means_opt_in_only() {
        let compiled = compile(None).unwrap();
        assert_eq!(compiled.clause, "consent_state = ?");
        assert_eq!(compiled.params, vec!["OPT_IN".to_string()]);
    }

    #[test]
    fn leaf_on_first_class_column() {
        let predicate = SegmentPredicate::Leaf {
            attribute: "consent_state".to_string(),
            operator: Operator::Equals,
            value: "OPT_IN".to_string(),
        };
        let compiled = compile(Some(&predicate)).unwrap();
        assert_eq!(compiled.clause, "consent_state = ?");
    }

    #[test]
    fn leaf_on_attribute_map_uses_json_extract() {
        let predicate = SegmentPredicate::Leaf {
            attribute: "city".to_string(),
            operator: Operator::Contains,
            value: "York".to_string(),
        };
        let compiled = compile(Some(&predicate)).unwrap();
        assert!(compiled.clause.contains("json_extract(attributes, '$.city')"));
        assert_eq!(compiled.params, vec!["%York%".to_string()]);
    }

    #[test]
    fn composite_and_joins_with_parens() {
        let predicate = SegmentPredicate::Composite {
            conditions: vec![
                SegmentPredicate::Leaf {
                    attribute: "consent_state".to_string(),
                    operator: Operator::Equals,
                    value: "OPT_IN".to_string(),
                },
                SegmentPredicate::Leaf {
                    attribute: "plan".to_string(),
                    operator: Operator::Equals,
                    value: "pro".to_string(),
                },
            ],
            logic: Logic::And,
        };
        let compiled = compile(Some(&predicate)).unwrap();
        assert_eq!(
            compiled.clause,
            "(consent_state = ?) AND (json_extract(attributes, '$.plan') = ?)"
        );
        assert_eq!(compiled.params, vec!["OPT_IN".to_string(), "pro".to_string()]);
    }

    #[test]
    fn empty_composite_is_rejected() {
        let predicate = SegmentPredicate::Composite {
            conditions: vec![],
            logic: Logic::Or,
        };
        assert!(compile(Some(&predicate)).is_err());
    }

    #[test]
    fn attribute_sanitization_strips_unsafe_characters() {
        let predicate = SegmentPredicate::Leaf {
            attribute: "city'; DROP TABLE users;--".to_string(),
            operator: Operator::Equals,
            value: "x".to_string(),
        };
        let compiled = compile(Some(&predicate)).unwrap();
        assert!(!compiled.clause.contains(';'));
        assert!(!compiled.clause.contains('\''));
    }
}
