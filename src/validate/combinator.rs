//! Validation Combinators
//!
//! Small building blocks that each check one field and return a typed
//! [`Rejection`] naming the field, its raw value and the rule it broke.
//! Command predicates are chains of these joined with [`all_of`] or `?`.

use crate::catalog::{ItemInconsistency, QuestInconsistency};
use crate::core::tile::{TilePosition, DUNGEON_HEIGHT, DUNGEON_WIDTH};

/// Why a field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Outside an inclusive range.
    OutOfRange {
        /// Lowest accepted value.
        min: i64,
        /// Highest accepted value.
        max: i64,
    },
    /// Not a member of an allowed set.
    NotOneOf,
    /// Names nothing in the loaded catalogs.
    UnknownId,
    /// Disagrees with another field or catalog entry.
    Inconsistent(&'static str),
    /// Item creation info disagrees with its catalog entry.
    Item(ItemInconsistency),
    /// Quest record is not reachable for its quest.
    Quest(QuestInconsistency),
}

impl From<ItemInconsistency> for Reason {
    fn from(err: ItemInconsistency) -> Self {
        Reason::Item(err)
    }
}

impl From<QuestInconsistency> for Reason {
    fn from(err: QuestInconsistency) -> Self {
        Reason::Quest(err)
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::OutOfRange { min, max } => write!(f, "not in {min}..={max}"),
            Reason::NotOneOf => write!(f, "not an allowed value"),
            Reason::UnknownId => write!(f, "unknown id"),
            Reason::Inconsistent(what) => write!(f, "{what}"),
            Reason::Item(err) => write!(f, "{err}"),
            Reason::Quest(err) => write!(f, "{err}"),
        }
    }
}

/// A failed field check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{rule}({field}: {value}) failed: {reason}")]
pub struct Rejection {
    /// Combinator that failed.
    pub rule: &'static str,
    /// Field name.
    pub field: &'static str,
    /// Raw field value.
    pub value: i64,
    /// Failure detail.
    pub reason: Reason,
}

/// Outcome of a check.
pub type Verdict = Result<(), Rejection>;

/// Accept `value` in `min..=max`.
pub fn in_range(field: &'static str, value: impl Into<i64>, min: i64, max: i64) -> Verdict {
    let value = value.into();
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Rejection {
            rule: "in_range",
            field,
            value,
            reason: Reason::OutOfRange { min, max },
        })
    }
}

/// Accept `value` in `0..bound`.
pub fn below(field: &'static str, value: impl Into<i64>, bound: impl Into<i64>) -> Verdict {
    let value = value.into();
    let bound = bound.into();
    if (0..bound).contains(&value) {
        Ok(())
    } else {
        Err(Rejection {
            rule: "below",
            field,
            value,
            reason: Reason::OutOfRange {
                min: 0,
                max: bound - 1,
            },
        })
    }
}

/// Accept `value` in `0..=max`.
pub fn at_most(field: &'static str, value: impl Into<i64>, max: impl Into<i64>) -> Verdict {
    in_range(field, value, 0, max.into())
}

/// Accept `value` when it is one of `allowed`.
pub fn is_one_of(field: &'static str, value: impl Into<i64>, allowed: &[i64]) -> Verdict {
    let value = value.into();
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(Rejection {
            rule: "is_one_of",
            field,
            value,
            reason: Reason::NotOneOf,
        })
    }
}

/// Accept when `found` is true; the id is otherwise unknown.
pub fn exists(field: &'static str, value: impl Into<i64>, found: bool) -> Verdict {
    if found {
        Ok(())
    } else {
        Err(Rejection {
            rule: "exists",
            field,
            value: value.into(),
            reason: Reason::UnknownId,
        })
    }
}

/// Accept when a cross-field check passed.
pub fn consistent<E: Into<Reason>>(
    field: &'static str,
    value: impl Into<i64>,
    check: Result<(), E>,
) -> Verdict {
    check.map_err(|err| Rejection {
        rule: "consistent",
        field,
        value: value.into(),
        reason: err.into(),
    })
}

/// Accept when `matches` holds; otherwise the field contradicts `what`.
pub fn agrees(field: &'static str, value: impl Into<i64>, matches: bool, what: &'static str) -> Verdict {
    consistent(field, value, if matches { Ok(()) } else { Err(Reason::Inconsistent(what)) })
}

/// Accept a tile inside the dungeon grid.
pub fn in_bounds(position: TilePosition) -> Verdict {
    all_of([
        below("x", position.x, DUNGEON_WIDTH),
        below("y", position.y, DUNGEON_HEIGHT),
    ])
}

/// Accept when every check passed; report the first failure otherwise.
pub fn all_of<I>(checks: I) -> Verdict
where
    I: IntoIterator<Item = Verdict>,
{
    checks.into_iter().collect()
}

// =============================================================================
// TESTS
// =============================================================================
