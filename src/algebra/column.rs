//! Column names, value types, literals and small payload helpers shared by
//! all operator kinds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Symbolic, address-free column name
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Column(Arc<str>);

impl Column {
    pub fn new(name: &str) -> Self {
        Column(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::new(name)
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column(Arc::from(name))
    }
}

/// Value types of the algebra
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgType {
    Nat,
    Int,
    Dbl,
    Dec,
    Str,
    Bln,
    Node,
    Any,
}

impl fmt::Display for AlgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgType::Nat => "nat",
            AlgType::Int => "int",
            AlgType::Dbl => "dbl",
            AlgType::Dec => "dec",
            AlgType::Str => "str",
            AlgType::Bln => "bln",
            AlgType::Node => "node",
            AlgType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Literal values (literal tables, attach)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Atom {
    Nat(u64),
    Int(i64),
    Dbl(f64),
    Str(String),
    Bln(bool),
}

impl Atom {
    pub fn ty(&self) -> AlgType {
        match self {
            Atom::Nat(_) => AlgType::Nat,
            Atom::Int(_) => AlgType::Int,
            Atom::Dbl(_) => AlgType::Dbl,
            Atom::Str(_) => AlgType::Str,
            Atom::Bln(_) => AlgType::Bln,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Nat(v) => write!(f, "#{v}"),
            Atom::Int(v) => write!(f, "{v}"),
            Atom::Dbl(v) => write!(f, "{v:?}"),
            Atom::Str(v) => write!(f, "\"{v}\""),
            Atom::Bln(v) => write!(f, "{v}"),
        }
    }
}

/// One output column of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaItem {
    pub name: Column,
    pub ty: AlgType,
}

impl SchemaItem {
    pub fn new(name: impl Into<Column>, ty: AlgType) -> Self {
        SchemaItem {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered output schema, names unique within a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<SchemaItem>);

impl Schema {
    pub fn new(items: Vec<SchemaItem>) -> Self {
        Schema(items)
    }

    pub fn items(&self) -> &[SchemaItem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, col: &Column) -> bool {
        self.0.iter().any(|item| &item.name == col)
    }

    pub fn ty_of(&self, col: &Column) -> Option<AlgType> {
        self.0.iter().find(|item| &item.name == col).map(|item| item.ty)
    }

    /// Column names in schema order
    pub fn names(&self) -> impl Iterator<Item = &Column> + '_ {
        self.0.iter().map(|item| &item.name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchemaItem> {
        self.0.iter()
    }

    pub(crate) fn push(&mut self, item: SchemaItem) {
        self.0.push(item);
    }
}

/// Projection entry: output column `new` carries the values of input `old`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjPair {
    pub new: Column,
    pub old: Column,
}

/// Shorthand for a projection entry
pub fn proj(new: impl Into<Column>, old: impl Into<Column>) -> ProjPair {
    ProjPair {
        new: new.into(),
        old: old.into(),
    }
}

/// Identity projection over the given columns
pub fn proj_identity<'a>(cols: impl IntoIterator<Item = &'a Column>) -> Vec<ProjPair> {
    cols.into_iter()
        .map(|c| ProjPair {
            new: c.clone(),
            old: c.clone(),
        })
        .collect()
}

/// Look up the input column a projection binds to `new`
pub fn proj_source<'a>(list: &'a [ProjPair], new: &Column) -> Option<&'a Column> {
    list.iter().find(|p| &p.new == new).map(|p| &p.old)
}

/// Sort criterion of numbering operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub col: Column,
    #[serde(default)]
    pub desc: bool,
}

impl SortKey {
    pub fn asc(col: impl Into<Column>) -> Self {
        SortKey {
            col: col.into(),
            desc: false,
        }
    }
}

/// Comparison kinds of predicates and comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    /// The comparison that holds exactly when `self` does not
    pub fn negate(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Gt => Comparison::Le,
            Comparison::Le => Comparison::Gt,
            Comparison::Ge => Comparison::Lt,
            Comparison::Lt => Comparison::Ge,
        }
    }

    /// The comparison to use when the two operands trade places
    pub fn swap(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Eq,
            Comparison::Ne => Comparison::Ne,
            Comparison::Gt => Comparison::Lt,
            Comparison::Lt => Comparison::Gt,
            Comparison::Ge => Comparison::Le,
            Comparison::Le => Comparison::Ge,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
        }
    }
}

/// Hands out column names that are unused anywhere in the DAG
#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    used: HashSet<Column>,
    counter: u64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a name as taken
    pub fn reserve(&mut self, col: &Column) {
        if !self.used.contains(col) {
            self.used.insert(col.clone());
        }
    }

    pub fn is_used(&self, col: &Column) -> bool {
        self.used.contains(col)
    }

    /// A globally fresh name derived from `base`
    pub fn fresh(&mut self, base: &Column) -> Column {
        let stem = strip_suffix(base.as_str());
        loop {
            self.counter += 1;
            let candidate = Column::new(&format!("{stem}_{}", self.counter));
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

/// `item_12` -> `item`, so repeated renaming does not grow names
fn strip_suffix(name: &str) -> &str {
    match name.rfind('_') {
        Some(pos)
            if pos > 0
                && pos + 1 < name.len()
                && name[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &name[..pos]
        }
        _ => name,
    }
}
