use crate::catalog::schema::DatasetId;
use crate::catalog::types::Value;
use crate::error::BrowseError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, BrowseError> {
        match raw {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(BrowseError::invalid(format!(
                "sort direction must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

/// Storage identity of a grid column, independent of where it sits in the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnTarget {
    Key,
    Field { dataset: DatasetId, code: String },
}

impl fmt::Display for ColumnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnTarget::Key => f.write_str("key"),
            ColumnTarget::Field { dataset, code } => write!(f, "{dataset}.{code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-insensitive substring match on the value's text rendering.
    Contains {
        position: usize,
        target: ColumnTarget,
        needle: String,
    },
    /// Inclusive numeric range on the value cast to its declared kind.
    Range {
        position: usize,
        target: ColumnTarget,
        low: Value,
        high: Value,
    },
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::Integer(v) => format!("i:{v}"),
        Value::Float(v) => format!("f:{v:?}"),
        Value::Text(s) => format!("t:{}:{s}", s.len()),
        Value::Null => "n".to_string(),
    }
}

impl Predicate {
    pub fn position(&self) -> usize {
        match self {
            Predicate::Contains { position, .. } | Predicate::Range { position, .. } => *position,
        }
    }

    pub fn target(&self) -> &ColumnTarget {
        match self {
            Predicate::Contains { target, .. } | Predicate::Range { target, .. } => target,
        }
    }

    /// Fixed-field-order encoding; needles are length-prefixed so `|` cannot collide.
    pub fn canonical(&self) -> String {
        match self {
            Predicate::Contains { target, needle, .. } => {
                format!("contains|{target}|{}:{needle}", needle.len())
            }
            Predicate::Range {
                target, low, high, ..
            } => format!(
                "range|{target}|{}|{}",
                canonical_value(low),
                canonical_value(high)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Combinator::And => "and",
            Combinator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredicateSet {
    pub combinator: Combinator,
    pub predicates: Vec<Predicate>,
}

impl Default for PredicateSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PredicateSet {
    pub fn empty() -> Self {
        Self {
            combinator: Combinator::And,
            predicates: Vec::new(),
        }
    }

    pub fn all(predicates: Vec<Predicate>) -> Self {
        Self {
            combinator: Combinator::And,
            predicates,
        }
    }

    pub fn any(predicates: Vec<Predicate>) -> Self {
        Self {
            combinator: Combinator::Or,
            predicates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Encoding that does not depend on the order predicates were supplied in.
    pub fn canonical(&self) -> String {
        let mut tuples: Vec<String> = self.predicates.iter().map(Predicate::canonical).collect();
        tuples.sort();
        tuples.dedup();
        format!(
            "op={};predicates=[{}]",
            if self.is_empty() {
                "none"
            } else {
                self.combinator.as_str()
            },
            tuples.join(",")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub position: usize,
    pub target: ColumnTarget,
    pub direction: Direction,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::key_ascending()
    }
}

impl SortSpec {
    pub fn key_ascending() -> Self {
        Self {
            position: 0,
            target: ColumnTarget::Key,
            direction: Direction::Asc,
        }
    }
}

/// Everything a grid request asks for besides the page window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryShape {
    pub predicates: PredicateSet,
    pub sort: SortSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(code: &str) -> ColumnTarget {
        ColumnTarget::Field {
            dataset: DatasetId(1),
            code: code.into(),
        }
    }

    #[test]
    fn canonical_encoding_ignores_predicate_order() {
        let a = Predicate::Contains {
            position: 1,
            target: field("cgram"),
            needle: "NOM".into(),
        };
        let b = Predicate::Range {
            position: 2,
            target: field("freq"),
            low: Value::Float(1.0),
            high: Value::Float(2.0),
        };
        let left = PredicateSet::all(vec![a.clone(), b.clone()]);
        let right = PredicateSet::all(vec![b, a]);
        assert_eq!(left.canonical(), right.canonical());
    }

    #[test]
    fn combinator_is_part_of_the_encoding() {
        let p = Predicate::Contains {
            position: 0,
            target: ColumnTarget::Key,
            needle: "ch".into(),
        };
        let q = Predicate::Contains {
            position: 1,
            target: field("phon"),
            needle: "ch".into(),
        };
        assert_ne!(
            PredicateSet::all(vec![p.clone(), q.clone()]).canonical(),
            PredicateSet::any(vec![p, q]).canonical()
        );
        assert_eq!(PredicateSet::empty().canonical(), "op=none;predicates=[]");
    }

    #[test]
    fn separators_inside_needles_do_not_collide() {
        let one = Predicate::Contains {
            position: 0,
            target: ColumnTarget::Key,
            needle: "a|b".into(),
        };
        let other = Predicate::Contains {
            position: 0,
            target: ColumnTarget::Key,
            needle: "a".into(),
        };
        assert_ne!(one.canonical(), other.canonical());
    }

    #[test]
    fn direction_parsing_is_strict() {
        assert_eq!(Direction::parse("desc").unwrap(), Direction::Desc);
        assert!(Direction::parse("DESC").is_err());
        assert_eq!(Direction::Asc.reverse(), Direction::Desc);
    }
}
