use serde::{Deserialize, Serialize};

use crate::data::{DataType, DataValue};

/// A SQLIL expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    Param(Param),
    /// The implicit comparison argument inside `CASE <arg> WHEN ...`
    CaseTest(DataType),
    UnaryOp(UnaryOp),
    BinaryOp(BinaryOp),
    /// `<expr> IN (...)` / `<expr> NOT IN (...)`
    ArrayComparison(ArrayComparison),
    Bool(BoolExpr),
    IsNull(IsNull),
    DistinctFrom(DistinctFrom),
    NullIf(NullIf),
    Case(Case),
    Coalesce(Coalesce),
    FunctionCall(FunctionCall),
    Aggregate(Aggregate),
    Cast(Cast),
    /// A node kind the planner knows but this AST does not model
    /// (window functions, sublinks, row expressions, ...).
    /// Always untranslatable; carried so callers can still hold the tree.
    Unsupported(String),
}

type SubExpr = Box<Expr>;

impl Expr {
    pub fn column(rel_id: u32, attnum: i16, r#type: DataType) -> Self {
        Self::Column(ColumnRef::new(rel_id, attnum, r#type))
    }

    pub fn literal(value: DataValue) -> Self {
        Self::Literal(Literal::new(value))
    }

    pub fn param(id: u32, r#type: DataType) -> Self {
        Self::Param(Param::new(id, r#type))
    }

    pub fn binary(left: Expr, name: impl Into<String>, right: Expr) -> Self {
        Self::BinaryOp(BinaryOp::new(left, name, right))
    }

    /// Best-effort static type of the expression.
    ///
    /// Comparison and boolean nodes yield Boolean; arithmetic yields the
    /// left operand's type. Good enough for the operand-type gates the
    /// deparser applies; not a substitute for the planner's type analysis.
    pub fn r#type(&self) -> DataType {
        match self {
            Expr::Column(c) => c.r#type.clone(),
            Expr::Literal(l) => (&l.value).into(),
            Expr::Param(p) => p.r#type.clone(),
            Expr::CaseTest(t) => t.clone(),
            Expr::UnaryOp(o) => o.expr.r#type(),
            Expr::BinaryOp(o) => {
                if o.is_comparison() {
                    DataType::Boolean
                } else {
                    o.left.r#type()
                }
            }
            Expr::ArrayComparison(_) => DataType::Boolean,
            Expr::Bool(_) => DataType::Boolean,
            Expr::IsNull(_) => DataType::Boolean,
            Expr::DistinctFrom(_) => DataType::Boolean,
            Expr::NullIf(n) => n.left.r#type(),
            Expr::Case(c) => c.r#type.clone(),
            Expr::Coalesce(c) => c.r#type.clone(),
            Expr::FunctionCall(f) => f.ret_type.clone(),
            Expr::Aggregate(a) => a
                .arg
                .as_ref()
                .map(|e| e.r#type())
                .unwrap_or(DataType::Int64),
            Expr::Cast(c) => c.r#type.clone(),
            Expr::Unsupported(_) => DataType::Null,
        }
    }
}

/// Collation attached to an expression node.
///
/// Used to decide whether pushing a string expression to the remote engine
/// could change comparison semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Collation {
    /// The node is not collatable
    #[default]
    None,
    /// The default collation of the local database
    Default,
    /// An explicitly set, non-default collation
    Other(String),
}

/// A reference to a column of a relation in scope (or, when the relation
/// is not in scope, a runtime parameter supplied by the host executor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Scope key of the relation the column belongs to
    pub rel_id: u32,
    /// Local attribute number (1-based)
    pub attnum: i16,
    /// Local type of the column
    pub r#type: DataType,
    pub collation: Collation,
}

impl ColumnRef {
    pub fn new(rel_id: u32, attnum: i16, r#type: DataType) -> Self {
        let collation = if r#type.is_textual() {
            Collation::Default
        } else {
            Collation::None
        };
        Self {
            rel_id,
            attnum,
            r#type,
            collation,
        }
    }
}

/// A constant embedded in the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub value: DataValue,
    pub collation: Collation,
}

impl Literal {
    pub fn new(value: DataValue) -> Self {
        Self {
            value,
            collation: Collation::None,
        }
    }
}

/// A runtime parameter supplied by the host executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub id: u32,
    pub r#type: DataType,
}

impl Param {
    pub fn new(id: u32, r#type: DataType) -> Self {
        Self { id, r#type }
    }
}

/// A unary operator applied to one expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryOp {
    /// Operator name as spelled in the local catalog ("-", "|/", "@")
    pub name: String,
    /// Whether the operator lives in the standard catalog namespace
    pub builtin: bool,
    pub expr: SubExpr,
}

impl UnaryOp {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            builtin: true,
            expr: Box::new(expr),
        }
    }
}

/// A binary operator applied to two expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOp {
    /// Operator name as spelled in the local catalog
    pub name: String,
    /// Whether the operator lives in the standard catalog namespace
    pub builtin: bool,
    pub left: SubExpr,
    pub right: SubExpr,
}

impl BinaryOp {
    pub fn new(left: Expr, name: impl Into<String>, right: Expr) -> Self {
        Self {
            name: name.into(),
            builtin: true,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self.name.as_str(), "=" | "<>" | "<" | ">" | "<=" | ">=")
    }
}

/// `<left> <op> ANY/ALL (<elements>)`, i.e. the IN / NOT IN forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayComparison {
    /// The element comparison operator, "=" or "<>"
    pub op: String,
    /// true for ANY (IN), false for ALL (NOT IN)
    pub any: bool,
    pub builtin: bool,
    pub left: SubExpr,
    pub elements: ArrayElements,
}

/// The right-hand side of an IN list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayElements {
    /// A constant array value
    Values {
        r#type: DataType,
        values: Vec<DataValue>,
    },
    /// An array constructor over arbitrary expressions
    Exprs(Vec<Expr>),
}

/// Boolean AND/OR/NOT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolExpr {
    pub op: BoolOp,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

/// `IS [NOT] NULL`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsNull {
    pub expr: SubExpr,
    pub negated: bool,
}

/// `IS [NOT] DISTINCT FROM`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctFrom {
    pub left: SubExpr,
    pub right: SubExpr,
    pub negated: bool,
}

/// `NULLIF(left, right)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullIf {
    pub left: SubExpr,
    pub right: SubExpr,
}

/// `CASE [arg] WHEN ... THEN ... [ELSE ...] END`
///
/// For the arg form, each when-test is expected to be
/// `BinaryOp("=", CaseTest, <rhs>)`; the deparser rejects other shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub arg: Option<SubExpr>,
    pub whens: Vec<CaseWhen>,
    pub r#else: Option<SubExpr>,
    pub r#type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWhen {
    pub test: Expr,
    pub result: Expr,
}

/// `COALESCE(...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coalesce {
    pub args: Vec<Expr>,
    pub r#type: DataType,
}

/// A call to a named function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name as spelled in the local catalog, lower case
    pub name: String,
    /// Whether the call was written schema-qualified
    pub schema_qualified: bool,
    /// Whether the function lives in the standard catalog namespace
    pub builtin: bool,
    pub args: Vec<Expr>,
    pub ret_type: DataType,
    /// Result collation of the call
    pub collation: Collation,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<Expr>, ret_type: DataType) -> Self {
        Self {
            name: name.into(),
            schema_qualified: false,
            builtin: true,
            args,
            ret_type,
            collation: Collation::None,
        }
    }
}

/// An aggregate function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub func: AggFunc,
    pub distinct: bool,
    /// COUNT(*) form
    pub star: bool,
    pub arg: Option<SubExpr>,
    /// Whether the call carries an aggregate-level ORDER BY
    pub has_order_by: bool,
}

impl Aggregate {
    pub fn new(func: AggFunc, arg: Expr) -> Self {
        Self {
            func,
            distinct: false,
            star: false,
            arg: Some(Box::new(arg)),
            has_order_by: false,
        }
    }

    pub fn count_star() -> Self {
        Self {
            func: AggFunc::Count,
            distinct: false,
            star: true,
            arg: None,
            has_order_by: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Any other aggregate; never translatable
    Other(String),
}

/// A type conversion.
///
/// `via_io` marks conversions performed through the type's text I/O
/// functions; only the `'now'::timestamp` family of these is translatable.
/// Non-I/O casts are binary-compatible relabellings and deparse
/// transparently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    pub expr: SubExpr,
    pub r#type: DataType,
    pub via_io: bool,
}

/// A sort key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl Ordering {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
            nulls_first: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: false,
            nulls_first: true,
        }
    }
}
