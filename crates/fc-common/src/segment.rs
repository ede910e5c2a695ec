//! Segment predicate grammar (§4.5). The tree shape lives here because both
//! the Segment Evaluator (which compiles it to SQL) and the Storage Gateway
//! (which persists/reads Segment rows) need the same type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentPredicate {
    Leaf {
        attribute: String,
        operator: Operator,
        value: String,
    },
    Composite {
        conditions: Vec<SegmentPredicate>,
        logic: Logic,
    },
}
