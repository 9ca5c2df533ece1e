//! Filter predicates evaluated against one heap item at a time.
//!
//! Filters are built by a front end (typically from parsed query text) with
//! the free functions in this module and handed to [`HeapIndex::query`].
//! Evaluation is ternary: a `Fail` aborts the whole query.

use hprof_core::{FieldValue, JvmType, ObjectId, Value};
use std::cmp::Ordering;
use std::fmt;

use crate::heap::HeapItem;
use crate::index::HeapIndex;
use crate::matching::matches_class_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult {
    Match,
    NoMatch,
    Fail(String),
}

impl FilterResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    fn from_bool(matched: bool) -> Self {
        if matched {
            Self::Match
        } else {
            Self::NoMatch
        }
    }
}

/// A predicate over heap items.
///
/// Implementations must not mutate shared state: one filter may be evaluated
/// by several concurrent queries.
pub trait Filter: fmt::Debug + Send + Sync {
    fn evaluate(&self, item: &HeapItem, index: &HeapIndex) -> FilterResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Right-hand side of a field comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// A dotted chain of field names, e.g. `mParent.mName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Follows an object-typed field of an instance to the item it references.
/// `None` for a missing or non-object field, a null reference, or a
/// reference to an item that is not in the index.
fn follow<'i>(item: &HeapItem, field: &str, index: &'i HeapIndex) -> Option<&'i HeapItem> {
    let target = item.as_instance()?.field(field)?.as_object()?;
    if target.is_null() {
        return None;
    }
    index.resolve(target).map(|r| &**r)
}

#[derive(Debug, Clone, Copy)]
pub struct FetchAll;

impl Filter for FetchAll {
    fn evaluate(&self, _item: &HeapItem, _index: &HeapIndex) -> FilterResult {
        FilterResult::Match
    }
}

#[derive(Debug)]
pub struct Not(pub Box<dyn Filter>);

impl Filter for Not {
    fn evaluate(&self, item: &HeapItem, index: &HeapIndex) -> FilterResult {
        match self.0.evaluate(item, index) {
            FilterResult::Match => FilterResult::NoMatch,
            FilterResult::NoMatch => FilterResult::Match,
            fail @ FilterResult::Fail(_) => fail,
        }
    }
}

#[derive(Debug)]
pub struct And(pub Box<dyn Filter>, pub Box<dyn Filter>);

impl Filter for And {
    fn evaluate(&self, item: &HeapItem, index: &HeapIndex) -> FilterResult {
        let left = self.0.evaluate(item, index);
        if let FilterResult::Fail(_) = left {
            return left;
        }
        let right = self.1.evaluate(item, index);
        if let FilterResult::Fail(_) = right {
            return right;
        }
        FilterResult::from_bool(left.is_match() && right.is_match())
    }
}

#[derive(Debug)]
pub struct Or(pub Box<dyn Filter>, pub Box<dyn Filter>);

impl Filter for Or {
    fn evaluate(&self, item: &HeapItem, index: &HeapIndex) -> FilterResult {
        let left = self.0.evaluate(item, index);
        if let FilterResult::Fail(_) = left {
            return left;
        }
        let right = self.1.evaluate(item, index);
        if let FilterResult::Fail(_) = right {
            return right;
        }
        FilterResult::from_bool(left.is_match() || right.is_match())
    }
}

/// Case-insensitive segment match on the item's class name.
#[derive(Debug, Clone)]
pub struct ClassName {
    pub pattern: String,
}

impl Filter for ClassName {
    fn evaluate(&self, item: &HeapItem, _index: &HeapIndex) -> FilterResult {
        FilterResult::from_bool(
            item.class_name()
                .is_some_and(|name| matches_class_name(&name, &self.pattern)),
        )
    }
}

/// Exact-name match against the item's class or any of its super-classes.
#[derive(Debug, Clone)]
pub struct InstanceOf {
    pub class_name: String,
}

impl Filter for InstanceOf {
    fn evaluate(&self, item: &HeapItem, _index: &HeapIndex) -> FilterResult {
        FilterResult::from_bool(item.instance_of(&self.class_name))
    }
}

#[derive(Debug, Clone)]
pub struct FieldCompare {
    pub path: FieldPath,
    pub op: CompareOp,
    pub literal: Literal,
}

impl Filter for FieldCompare {
    fn evaluate(&self, item: &HeapItem, index: &HeapIndex) -> FilterResult {
        let Some((last, hops)) = self.path.segments().split_last() else {
            return FilterResult::NoMatch;
        };
        let mut current = item;
        for hop in hops {
            match follow(current, hop, index) {
                Some(next) => current = next,
                None => return FilterResult::NoMatch,
            }
        }
        let Some(value) = current.as_instance().and_then(|i| i.field(last)) else {
            return FilterResult::NoMatch;
        };
        self.compare(value, index)
    }
}

impl FieldCompare {
    #[allow(clippy::cast_precision_loss)]
    fn compare(&self, value: FieldValue<'_>, index: &HeapIndex) -> FilterResult {
        let Some(actual) = value.decode() else {
            return FilterResult::NoMatch;
        };
        let ty = actual.ty();
        match (&self.literal, actual) {
            (Literal::Bool(expected), Value::Bool(v)) => self.equality(v == *expected),
            (Literal::Int(expected), Value::Object(id)) => {
                self.equality(u64::try_from(*expected).is_ok_and(|e| id == ObjectId(e)))
            }
            (Literal::Text(expected), Value::Object(id)) => {
                if !self.op.is_equality() || id.is_null() {
                    return FilterResult::NoMatch;
                }
                let text = index
                    .resolve(id)
                    .and_then(|item| item.as_string())
                    .and_then(|s| s.value());
                match text {
                    Some(text) => self.equality(text == expected),
                    None => FilterResult::NoMatch,
                }
            }
            (Literal::Text(expected), Value::Char(v)) => {
                let mut units = expected.encode_utf16();
                match (units.next(), units.next()) {
                    (Some(unit), None) => self.ordered(Some(v.cmp(&unit))),
                    _ => self.type_mismatch(ty),
                }
            }
            (Literal::Int(expected), v) if ty.is_integral() => {
                self.ordered(v.as_i64().map(|v| v.cmp(expected)))
            }
            (Literal::Int(expected), v) if ty.is_floating() => {
                self.ordered(v.as_f64().and_then(|v| v.partial_cmp(&(*expected as f64))))
            }
            (Literal::Double(expected), v) if ty.is_integral() || ty.is_floating() => {
                self.ordered(v.as_f64().and_then(|v| v.partial_cmp(expected)))
            }
            _ if !self.op.is_equality() && matches!(ty, JvmType::Bool | JvmType::Object) => {
                FilterResult::NoMatch
            }
            _ => self.type_mismatch(ty),
        }
    }

    /// NaN and undecodable values never match.
    fn ordered(&self, ordering: Option<Ordering>) -> FilterResult {
        FilterResult::from_bool(ordering.is_some_and(|o| self.op.holds(o)))
    }

    fn equality(&self, equal: bool) -> FilterResult {
        match self.op {
            CompareOp::Eq => FilterResult::from_bool(equal),
            CompareOp::Ne => FilterResult::from_bool(!equal),
            _ => FilterResult::NoMatch,
        }
    }

    fn type_mismatch(&self, ty: JvmType) -> FilterResult {
        FilterResult::Fail(format!(
            "cannot compare {ty} field {} {} {}",
            self.path,
            self.op.symbol(),
            self.literal
        ))
    }
}

/// Evaluates `filter` against the item referenced by one field.
#[derive(Debug)]
pub struct ApplyToField {
    pub field: String,
    pub filter: Box<dyn Filter>,
}

impl Filter for ApplyToField {
    fn evaluate(&self, item: &HeapItem, index: &HeapIndex) -> FilterResult {
        match follow(item, &self.field, index) {
            Some(target) => self.filter.evaluate(target, index),
            None => FilterResult::NoMatch,
        }
    }
}

pub fn fetch_all() -> Box<dyn Filter> {
    Box::new(FetchAll)
}

pub fn not(filter: Box<dyn Filter>) -> Box<dyn Filter> {
    Box::new(Not(filter))
}

pub fn and(left: Box<dyn Filter>, right: Box<dyn Filter>) -> Box<dyn Filter> {
    Box::new(And(left, right))
}

pub fn or(left: Box<dyn Filter>, right: Box<dyn Filter>) -> Box<dyn Filter> {
    Box::new(Or(left, right))
}

pub fn class_name(pattern: impl Into<String>) -> Box<dyn Filter> {
    Box::new(ClassName {
        pattern: pattern.into(),
    })
}

pub fn instance_of(class_name: impl Into<String>) -> Box<dyn Filter> {
    Box::new(InstanceOf {
        class_name: class_name.into(),
    })
}

pub fn compare(path: &str, op: CompareOp, literal: Literal) -> Box<dyn Filter> {
    Box::new(FieldCompare {
        path: FieldPath::parse(path),
        op,
        literal,
    })
}

pub fn apply_to_field(field: impl Into<String>, filter: Box<dyn Filter>) -> Box<dyn Filter> {
    Box::new(ApplyToField {
        field: field.into(),
        filter,
    })
}
