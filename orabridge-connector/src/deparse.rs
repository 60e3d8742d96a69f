//! Expression-tree to remote-SQL translation.
//!
//! The central contract is [`translate`]: an expression either renders to a
//! complete SQL fragment or the whole expression is rejected and the host
//! evaluates it locally. Rejection is a silent fallback, never an error;
//! the registry of out-of-line parameters is restored on rejection so a
//! rejected expression leaves no trace in the context.

use itertools::Itertools;
use orabridge_core::{
    data::{DataType, DataValue, IntervalValue},
    sqlil::{
        Aggregate, AggFunc, ArrayComparison, ArrayElements, BinaryOp, BoolOp, Case, Cast,
        Collation, ColumnRef, Expr, FunctionCall, Ordering, UnaryOp,
    },
};

use crate::{describe::quote_identifier, types::OracleType, TableDescriptor};

/// Verbatim token substituted with the host transaction's start timestamp
/// at bind time. Must never be rewritten during placeholder finalization.
pub const NOW_TOKEN: &str = "?/*:now*/";

/// Result of translating one expression
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    Translated(String),
    /// Not expressible in the remote dialect; evaluate locally
    Rejected,
}

impl Translation {
    pub fn translated(&self) -> Option<&str> {
        match self {
            Self::Translated(sql) => Some(sql),
            Self::Rejected => None,
        }
    }
}

/// Collation-safety tag propagated per node.
///
/// A fragment whose string semantics derive from a remote column is safe to
/// ship; one that introduces a local collation is not, even if every node
/// individually translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollSafety {
    /// Not collatable
    None,
    /// Collation derives from a remote column
    Safe,
    /// A locally-introduced collation; shipping could change comparisons
    Unsafe,
}

impl CollSafety {
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unsafe, _) | (_, Self::Unsafe) => Self::Unsafe,
            (Self::Safe, _) | (_, Self::Safe) => Self::Safe,
            _ => Self::None,
        }
    }
}

struct Fragment {
    sql: String,
    coll: CollSafety,
}

impl Fragment {
    fn new(sql: String, coll: CollSafety) -> Self {
        Self { sql, coll }
    }

    fn uncollated(sql: String) -> Self {
        Self::new(sql, CollSafety::None)
    }
}

/// One relation visible to column references during deparsing
pub struct TableScope<'a> {
    /// Scope key matching `ColumnRef::rel_id`
    pub rel_id: u32,
    /// Relation alias used to qualify columns in multi-relation queries
    pub alias: String,
    pub table: &'a TableDescriptor,
}

impl<'a> TableScope<'a> {
    pub fn new(rel_id: u32, alias: impl Into<String>, table: &'a TableDescriptor) -> Self {
        Self {
            rel_id,
            alias: alias.into(),
            table,
        }
    }
}

/// Ordered registry of out-of-line parameters discovered during deparsing.
///
/// Positions are 1-based and stable: a structurally-equal expression reuses
/// its earlier position instead of registering twice.
#[derive(Default)]
pub struct ParamRegistry {
    exprs: Vec<Expr>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the expression, registering it if unseen
    pub fn register(&mut self, expr: &Expr) -> usize {
        if let Some(pos) = self.exprs.iter().position(|e| e == expr) {
            return pos + 1;
        }
        self.exprs.push(expr.clone());
        self.exprs.len()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    fn truncate(&mut self, len: usize) {
        self.exprs.truncate(len);
    }
}

/// Everything an expression needs to deparse: the relations in scope, the
/// parameter registry, and whether aggregates are legal here
pub struct DeparseContext<'a> {
    scopes: &'a [TableScope<'a>],
    pub params: ParamRegistry,
    in_grouping: bool,
}

impl<'a> DeparseContext<'a> {
    pub fn new(scopes: &'a [TableScope<'a>]) -> Self {
        Self {
            scopes,
            params: ParamRegistry::new(),
            in_grouping: false,
        }
    }

    pub fn for_grouping(scopes: &'a [TableScope<'a>]) -> Self {
        Self {
            scopes,
            params: ParamRegistry::new(),
            in_grouping: true,
        }
    }

    fn qualify(&self) -> bool {
        self.scopes.len() > 1
    }

    fn find_column(&self, col: &ColumnRef) -> Option<(&TableScope<'a>, &crate::ColumnDescriptor)> {
        self.scopes
            .iter()
            .find(|s| s.rel_id == col.rel_id)
            .and_then(|s| {
                s.table
                    .column_by_attnum(col.attnum)
                    .map(|c| (s, c))
            })
    }
}

/// Translates one expression, or rejects it without side effects.
///
/// Deterministic: translating the same tree twice in fresh contexts yields
/// byte-identical text and identical registry contents.
pub fn translate(expr: &Expr, ctx: &mut DeparseContext) -> Translation {
    let snapshot = ctx.params.len();

    match walk(expr, ctx) {
        Some(frag) if frag.coll != CollSafety::Unsafe => Translation::Translated(frag.sql),
        _ => {
            ctx.params.truncate(snapshot);
            Translation::Rejected
        }
    }
}

/// Translates a sort key as an ORDER BY item
pub fn translate_ordering(ordering: &Ordering, ctx: &mut DeparseContext) -> Translation {
    let inner = match translate(&ordering.expr, ctx) {
        Translation::Translated(sql) => sql,
        Translation::Rejected => return Translation::Rejected,
    };

    Translation::Translated(format!(
        "{} {} NULLS {}",
        inner,
        if ordering.ascending { "ASC" } else { "DESC" },
        if ordering.nulls_first { "FIRST" } else { "LAST" }
    ))
}

fn walk(expr: &Expr, ctx: &mut DeparseContext) -> Option<Fragment> {
    match expr {
        Expr::Column(col) => walk_column(col, ctx),
        Expr::Literal(lit) => {
            let sql = render_literal(&lit.value)?;
            let coll = match lit.collation {
                Collation::None => CollSafety::None,
                _ => CollSafety::Unsafe,
            };
            Some(Fragment::new(sql, coll))
        }
        Expr::Param(_) => Some(Fragment::uncollated(format!(
            ":p{}",
            ctx.params.register(expr)
        ))),
        // Only meaningful inside CASE-with-arg, handled there
        Expr::CaseTest(_) => None,
        Expr::UnaryOp(op) => walk_unary(op, ctx),
        Expr::BinaryOp(op) => walk_binary(op, ctx),
        Expr::ArrayComparison(cmp) => walk_array_comparison(cmp, ctx),
        Expr::Bool(b) => {
            let frags = b
                .args
                .iter()
                .map(|a| walk(a, ctx))
                .collect::<Option<Vec<_>>>()?;
            let coll = frags
                .iter()
                .fold(CollSafety::None, |acc, f| acc.merge(f.coll));

            let sql = match b.op {
                BoolOp::Not => {
                    if frags.len() != 1 {
                        return None;
                    }
                    format!("(NOT {})", frags[0].sql)
                }
                BoolOp::And => format!("({})", frags.iter().map(|f| &f.sql).join(" AND ")),
                BoolOp::Or => format!("({})", frags.iter().map(|f| &f.sql).join(" OR ")),
            };
            Some(Fragment::new(sql, coll))
        }
        Expr::IsNull(n) => {
            let inner = walk(&n.expr, ctx)?;
            let sql = format!(
                "({} IS {}NULL)",
                inner.sql,
                if n.negated { "NOT " } else { "" }
            );
            Some(Fragment::new(sql, inner.coll))
        }
        Expr::DistinctFrom(d) => {
            let left = walk(&d.left, ctx)?;
            let right = walk(&d.right, ctx)?;
            // DECODE compares NULLs as equal, which is exactly the
            // DISTINCT FROM semantic
            let sql = format!(
                "(DECODE({}, {}, 0, 1) = {})",
                left.sql,
                right.sql,
                if d.negated { "0" } else { "1" }
            );
            Some(Fragment::new(sql, left.coll.merge(right.coll)))
        }
        Expr::NullIf(n) => {
            let left = walk(&n.left, ctx)?;
            let right = walk(&n.right, ctx)?;
            Some(Fragment::new(
                format!("NULLIF({}, {})", left.sql, right.sql),
                left.coll.merge(right.coll),
            ))
        }
        Expr::Case(case) => walk_case(case, ctx),
        Expr::Coalesce(c) => {
            let frags = c
                .args
                .iter()
                .map(|a| walk(a, ctx))
                .collect::<Option<Vec<_>>>()?;
            if frags.is_empty() {
                return None;
            }
            let coll = frags
                .iter()
                .fold(CollSafety::None, |acc, f| acc.merge(f.coll));
            Some(Fragment::new(
                format!("COALESCE({})", frags.iter().map(|f| &f.sql).join(", ")),
                coll,
            ))
        }
        Expr::FunctionCall(func) => walk_function(func, ctx),
        Expr::Aggregate(agg) => walk_aggregate(agg, ctx),
        Expr::Cast(cast) => walk_cast(cast, ctx),
        Expr::Unsupported(_) => None,
    }
}

fn walk_column(col: &ColumnRef, ctx: &mut DeparseContext) -> Option<Fragment> {
    let resolved = ctx
        .find_column(col)
        .map(|(scope, desc)| (scope.alias.clone(), desc.remote_name.clone(), desc.remote_type));

    let (alias, remote_name, remote_type) = match resolved {
        Some(resolved) => resolved,
        None => {
            // Out of scope: the host executor supplies the value at runtime
            let pos = ctx.params.register(&Expr::Column(col.clone()));
            return Some(Fragment::uncollated(format!(":p{}", pos)));
        }
    };

    // A text-typed local column is only shippable when the remote storage
    // is a character type; anything else round-trips through a conversion
    // the remote comparison would not see.
    if col.r#type.is_textual() && !remote_type.is_character() {
        return None;
    }

    let name = if ctx.qualify() {
        format!("{}.{}", alias, quote_identifier(&remote_name))
    } else {
        quote_identifier(&remote_name)
    };

    // Booleans are stored remotely as 0/1 numerics
    let sql = if col.r#type == DataType::Boolean && remote_type == OracleType::Number {
        format!("({} <> 0)", name)
    } else {
        name
    };

    let coll = match col.collation {
        Collation::None => CollSafety::None,
        Collation::Default => CollSafety::Safe,
        Collation::Other(_) => CollSafety::Unsafe,
    };

    Some(Fragment::new(sql, coll))
}

fn walk_unary(op: &UnaryOp, ctx: &mut DeparseContext) -> Option<Fragment> {
    if !op.builtin {
        return None;
    }

    let inner = walk(&op.expr, ctx)?;
    let sql = match op.name.as_str() {
        "-" => format!("(- {})", inner.sql),
        "|/" => format!("SQRT({})", inner.sql),
        "@" => format!("ABS({})", inner.sql),
        _ => return None,
    };

    Some(Fragment::new(sql, inner.coll))
}

fn walk_binary(op: &BinaryOp, ctx: &mut DeparseContext) -> Option<Fragment> {
    if !op.builtin {
        return None;
    }

    // Interval arithmetic against another interval never matches the remote
    // engine's semantics
    if op.left.r#type() == DataType::Interval && op.right.r#type() == DataType::Interval {
        return None;
    }

    // Ordering comparisons on character data depend on collation; only
    // equality is safe to ship
    if matches!(op.name.as_str(), "<" | ">" | "<=" | ">=")
        && (op.left.r#type().is_textual() || op.right.r#type().is_textual())
    {
        return None;
    }

    let left = walk(&op.left, ctx)?;
    let right = walk(&op.right, ctx)?;
    let coll = left.coll.merge(right.coll);

    let sql = match op.name.as_str() {
        "=" | "<>" | "<" | ">" | "<=" | ">=" | "+" | "-" | "*" => {
            format!("({} {} {})", left.sql, op.name, right.sql)
        }
        "^" => format!("POWER({}, {})", left.sql, right.sql),
        "%" => format!("MOD({}, {})", left.sql, right.sql),
        "&" => format!("BITAND({}, {})", left.sql, right.sql),
        "~~" => format!("({} LIKE {})", left.sql, right.sql),
        "!~~" => format!("({} NOT LIKE {})", left.sql, right.sql),
        "~~*" => format!("(UPPER({}) LIKE UPPER({}))", left.sql, right.sql),
        "!~~*" => format!("(UPPER({}) NOT LIKE UPPER({}))", left.sql, right.sql),
        _ => return None,
    };

    Some(Fragment::new(sql, coll))
}

fn walk_array_comparison(cmp: &ArrayComparison, ctx: &mut DeparseContext) -> Option<Fragment> {
    if !cmp.builtin {
        return None;
    }

    // Only `= ANY` (IN) and `<> ALL` (NOT IN) have remote equivalents
    let negated = match (cmp.op.as_str(), cmp.any) {
        ("=", true) => false,
        ("<>", false) => true,
        _ => return None,
    };

    let left = walk(&cmp.left, ctx)?;

    let elements: Vec<Fragment> = match &cmp.elements {
        ArrayElements::Values { values, .. } => values
            .iter()
            .map(|v| render_literal(v).map(Fragment::uncollated))
            .collect::<Option<Vec<_>>>()?,
        ArrayElements::Exprs(exprs) => exprs
            .iter()
            .map(|e| walk(e, ctx))
            .collect::<Option<Vec<_>>>()?,
    };

    // An empty IN list means "false" locally but is a syntax error remotely
    if elements.is_empty() {
        return None;
    }

    let coll = elements
        .iter()
        .fold(left.coll, |acc, f| acc.merge(f.coll));
    let sql = format!(
        "({} {}IN ({}))",
        left.sql,
        if negated { "NOT " } else { "" },
        elements.iter().map(|f| &f.sql).join(", ")
    );

    Some(Fragment::new(sql, coll))
}

fn walk_case(case: &Case, ctx: &mut DeparseContext) -> Option<Fragment> {
    if case.whens.is_empty() {
        return None;
    }

    let mut coll = CollSafety::None;
    let mut sql = String::from("CASE");

    if let Some(arg) = case.arg.as_deref() {
        let arg_frag = walk(arg, ctx)?;
        coll = coll.merge(arg_frag.coll);
        sql.push(' ');
        sql.push_str(&arg_frag.sql);

        for when in case.whens.iter() {
            // The arg form is only safe when every test is literally
            // "argument = rhs"; any other shape has no CASE-arg rendering
            let rhs = match &when.test {
                Expr::BinaryOp(op)
                    if op.name == "=" && matches!(op.left.as_ref(), Expr::CaseTest(_)) =>
                {
                    op.right.as_ref()
                }
                _ => return None,
            };

            let test = walk(rhs, ctx)?;
            let result = walk(&when.result, ctx)?;
            coll = coll.merge(test.coll).merge(result.coll);
            sql.push_str(&format!(" WHEN {} THEN {}", test.sql, result.sql));
        }
    } else {
        for when in case.whens.iter() {
            let test = walk(&when.test, ctx)?;
            let result = walk(&when.result, ctx)?;
            coll = coll.merge(test.coll).merge(result.coll);
            sql.push_str(&format!(" WHEN {} THEN {}", test.sql, result.sql));
        }
    }

    if let Some(e) = case.r#else.as_deref() {
        let frag = walk(e, ctx)?;
        coll = coll.merge(frag.coll);
        sql.push_str(&format!(" ELSE {}", frag.sql));
    }

    sql.push_str(" END");
    Some(Fragment::new(sql, coll))
}

/// Local function names with a remote equivalent. Identity unless renamed.
fn remote_function_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "abs" => "ABS",
        "acos" => "ACOS",
        "asin" => "ASIN",
        "atan" => "ATAN",
        "atan2" => "ATAN2",
        "ceil" | "ceiling" => "CEIL",
        "char_length" | "character_length" | "length" => "LENGTH",
        "concat" => "CONCAT",
        "cos" => "COS",
        "exp" => "EXP",
        "floor" => "FLOOR",
        "initcap" => "INITCAP",
        "lower" => "LOWER",
        "lpad" => "LPAD",
        "ltrim" => "LTRIM",
        "mod" => "MOD",
        "octet_length" => "LENGTHB",
        "position" | "strpos" => "INSTR",
        "pow" | "power" => "POWER",
        "replace" => "REPLACE",
        "round" => "ROUND",
        "rpad" => "RPAD",
        "rtrim" => "RTRIM",
        "sign" => "SIGN",
        "sin" => "SIN",
        "sqrt" => "SQRT",
        "substring" | "substr" => "SUBSTR",
        "tan" => "TAN",
        "translate" => "TRANSLATE",
        "trunc" => "TRUNC",
        "upper" => "UPPER",
        _ => return None,
    })
}

const EXTRACT_FIELDS: [&str; 6] = ["year", "month", "day", "hour", "minute", "second"];

fn walk_function(func: &FunctionCall, ctx: &mut DeparseContext) -> Option<Fragment> {
    if func.schema_qualified || !func.builtin {
        return None;
    }

    // The now() family renders as the transaction-timestamp token; its value
    // is anchored to the host transaction start, never re-evaluated remotely
    let now_cast = match func.name.as_str() {
        "now" | "transaction_timestamp" | "current_timestamp" => Some("TIMESTAMP WITH TIME ZONE"),
        "localtimestamp" => Some("TIMESTAMP"),
        "current_date" => Some("DATE"),
        _ => None,
    };
    if let Some(cast) = now_cast {
        if !func.args.is_empty() {
            return None;
        }
        return Some(Fragment::uncollated(format!(
            "CAST({} AS {})",
            NOW_TOKEN, cast
        )));
    }

    if matches!(func.name.as_str(), "date_part" | "extract") {
        return walk_extract(func, ctx);
    }

    let name = remote_function_name(&func.name)?;
    let frags = func
        .args
        .iter()
        .map(|a| walk(a, ctx))
        .collect::<Option<Vec<_>>>()?;

    let arg_coll = frags
        .iter()
        .fold(CollSafety::None, |acc, f| acc.merge(f.coll));
    let coll = match func.collation {
        Collation::None => arg_coll,
        _ => {
            if arg_coll == CollSafety::Safe {
                CollSafety::Safe
            } else {
                CollSafety::Unsafe
            }
        }
    };

    Some(Fragment::new(
        format!("{}({})", name, frags.iter().map(|f| &f.sql).join(", ")),
        coll,
    ))
}

fn walk_extract(func: &FunctionCall, ctx: &mut DeparseContext) -> Option<Fragment> {
    if func.args.len() != 2 {
        return None;
    }

    let field = match &func.args[0] {
        Expr::Literal(lit) => match &lit.value {
            DataValue::Utf8String(s) => s.to_lowercase(),
            _ => return None,
        },
        _ => return None,
    };
    if !EXTRACT_FIELDS.contains(&field.as_str()) {
        return None;
    }

    let arg = walk(&func.args[1], ctx)?;
    Some(Fragment::new(
        format!("EXTRACT({} FROM {})", field.to_uppercase(), arg.sql),
        arg.coll,
    ))
}

fn walk_aggregate(agg: &Aggregate, ctx: &mut DeparseContext) -> Option<Fragment> {
    // Aggregates only make sense when the remote query carries the grouping
    if !ctx.in_grouping || agg.has_order_by {
        return None;
    }

    let name = match &agg.func {
        AggFunc::Count => "COUNT",
        AggFunc::Sum => "SUM",
        AggFunc::Avg => "AVG",
        AggFunc::Min => "MIN",
        AggFunc::Max => "MAX",
        AggFunc::Other(_) => return None,
    };

    if agg.star {
        return Some(Fragment::uncollated(format!("{}(*)", name)));
    }

    let arg = walk(agg.arg.as_deref()?, ctx)?;
    Some(Fragment::new(
        format!(
            "{}({}{})",
            name,
            if agg.distinct { "DISTINCT " } else { "" },
            arg.sql
        ),
        arg.coll,
    ))
}

fn walk_cast(cast: &Cast, ctx: &mut DeparseContext) -> Option<Fragment> {
    if !cast.via_io {
        // Binary-compatible relabelling; nothing to render
        return walk(&cast.expr, ctx);
    }

    // The only I/O conversion with a remote equivalent is the literal
    // string 'now' cast to a temporal type
    let is_now = matches!(
        cast.expr.as_ref(),
        Expr::Literal(lit) if lit.value == DataValue::Utf8String("now".to_string())
    );
    if !is_now {
        return None;
    }

    let target = match cast.r#type {
        DataType::Date => "DATE",
        DataType::DateTime => "TIMESTAMP",
        DataType::DateTimeWithTZ => "TIMESTAMP WITH TIME ZONE",
        _ => return None,
    };

    Some(Fragment::uncollated(format!(
        "CAST({} AS {})",
        NOW_TOKEN, target
    )))
}

/// Renders a constant in the remote dialect, or None when the value's type
/// has no literal form there
fn render_literal(value: &DataValue) -> Option<String> {
    Some(match value {
        DataValue::Null => "NULL".to_string(),
        // The remote engine treats '' as NULL; pushing an empty string
        // literal would change comparison results
        DataValue::Utf8String(s) if s.is_empty() => return None,
        DataValue::Utf8String(s) => render_string(s),
        DataValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
        DataValue::Int16(v) => render_numeric(v.to_string()),
        DataValue::Int32(v) => render_numeric(v.to_string()),
        DataValue::Int64(v) => render_numeric(v.to_string()),
        DataValue::Float32(v) => render_numeric(v.to_string()),
        DataValue::Float64(v) => render_numeric(v.to_string()),
        DataValue::Decimal(v) => render_numeric(v.to_string()),
        DataValue::Date(d) => format!("CAST('{} 00:00:00' AS DATE)", d.format("%Y-%m-%d")),
        DataValue::DateTime(dt) => format!(
            "CAST('{}' AS TIMESTAMP)",
            dt.format("%Y-%m-%d %H:%M:%S%.9f")
        ),
        DataValue::DateTimeWithTZ(dt) => format!(
            "CAST('{}' AS TIMESTAMP WITH TIME ZONE)",
            dt.format("%Y-%m-%d %H:%M:%S%.9f %:z")
        ),
        DataValue::Interval(iv) => render_interval(iv)?,
        _ => return None,
    })
}

/// Single quotes doubled; values containing a backslash switch to the
/// escape-prefix form with backslashes doubled
fn render_string(s: &str) -> String {
    if s.contains('\\') {
        format!("E'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    } else {
        format!("'{}'", s.replace('\'', "''"))
    }
}

/// Numeric text passes through only when it is plain digits/sign/exponent;
/// anything else (NaN, infinity) is quoted
fn render_numeric(text: String) -> String {
    if text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        text
    } else {
        format!("'{}'", text)
    }
}

/// A sign-qualified INTERVAL term sequence, one explicit sign per magnitude
/// change
fn render_interval(iv: &IntervalValue) -> Option<String> {
    let parts = iv.parts();
    let seconds = if parts.seconds.fract() == 0.0 {
        format!("{}", parts.seconds as i64)
    } else {
        format!("{}", parts.seconds)
    };

    let terms: Vec<(String, &str)> = [
        (parts.years.to_string(), "YEAR"),
        (parts.months.to_string(), "MONTH"),
        (parts.days.to_string(), "DAY"),
        (parts.hours.to_string(), "HOUR"),
        (parts.minutes.to_string(), "MINUTE"),
        (seconds, "SECOND"),
    ]
    .into_iter()
    .filter(|(mag, _)| mag != "0")
    .collect();

    if terms.is_empty() {
        return Some("INTERVAL '0' SECOND".to_string());
    }

    let mut sql = String::new();
    for (i, (mag, unit)) in terms.iter().enumerate() {
        let (sign, abs) = match mag.strip_prefix('-') {
            Some(abs) => ("-", abs),
            None => ("+", mag.as_str()),
        };
        if i == 0 {
            if sign == "-" {
                sql.push_str("- ");
            }
        } else {
            sql.push_str(&format!(" {} ", sign));
        }
        sql.push_str(&format!("INTERVAL '{}' {}", abs, unit));
    }

    Some(if terms.len() > 1 {
        format!("({})", sql)
    } else {
        sql
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnDescriptor, TableOptions};
    use orabridge_core::data::{chrono::NaiveDate, DecimalOptions, StringOptions};
    use orabridge_core::sqlil::{self, CaseWhen, Literal};
    use pretty_assertions::assert_eq;

    fn column(name: &str, attnum: i16, remote: OracleType, local: DataType) -> ColumnDescriptor {
        ColumnDescriptor {
            remote_name: name.to_string(),
            remote_type: remote,
            char_len: 0,
            byte_len: 22,
            precision: 0,
            scale: 0,
            nullable: true,
            charset: 873,
            pkey_ordinal: if attnum == 1 { 1 } else { 0 },
            val_size: 23,
            attnum,
            local_name: name.to_lowercase(),
            local_type: local,
            type_mod: -1,
            strict_encoding: None,
            used: false,
        }
    }

    fn emp() -> TableDescriptor {
        TableDescriptor {
            options: TableOptions::new(Some("SCOTT"), "EMP"),
            local_name: "emp".to_string(),
            columns: vec![
                column("ID", 1, OracleType::Number, DataType::Int64),
                column(
                    "NAME",
                    2,
                    OracleType::Varchar2,
                    DataType::Utf8String(StringOptions::default()),
                ),
                column("ACTIVE", 3, OracleType::Number, DataType::Boolean),
                column(
                    "SALARY",
                    4,
                    OracleType::Number,
                    DataType::Decimal(DecimalOptions::default()),
                ),
                column("HIRED", 5, OracleType::Date, DataType::Date),
            ],
        }
    }

    fn translate_one(expr: &Expr) -> Translation {
        let table = emp();
        let scopes = [TableScope::new(1, "t1", &table)];
        let mut ctx = DeparseContext::new(&scopes);
        translate(expr, &mut ctx)
    }

    fn name_col() -> Expr {
        Expr::column(1, 2, DataType::Utf8String(StringOptions::default()))
    }

    fn id_col() -> Expr {
        Expr::column(1, 1, DataType::Int64)
    }

    #[test]
    fn test_equality_with_embedded_quote_literal() {
        let expr = Expr::binary(
            name_col(),
            "=",
            Expr::literal(DataValue::Utf8String("O'Brien".to_string())),
        );

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"("NAME" = 'O''Brien')"#.to_string())
        );
    }

    #[test]
    fn test_backslash_literal_switches_to_escape_form() {
        let expr = Expr::binary(
            name_col(),
            "=",
            Expr::literal(DataValue::Utf8String(r"a\b".to_string())),
        );

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"("NAME" = E'a\\b')"#.to_string())
        );
    }

    #[test]
    fn test_empty_string_literal_is_rejected() {
        let expr = Expr::binary(
            name_col(),
            "=",
            Expr::literal(DataValue::Utf8String(String::new())),
        );

        assert_eq!(translate_one(&expr), Translation::Rejected);
    }

    #[test]
    fn test_text_ordering_comparison_is_rejected() {
        let eq = Expr::binary(
            name_col(),
            "=",
            Expr::literal(DataValue::Utf8String("x".to_string())),
        );
        let lt = Expr::binary(
            name_col(),
            "<",
            Expr::literal(DataValue::Utf8String("x".to_string())),
        );

        assert!(matches!(translate_one(&eq), Translation::Translated(_)));
        assert_eq!(translate_one(&lt), Translation::Rejected);
    }

    #[test]
    fn test_boolean_column_wraps_as_numeric_test() {
        let expr = Expr::column(1, 3, DataType::Boolean);

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"("ACTIVE" <> 0)"#.to_string())
        );
    }

    #[test]
    fn test_out_of_scope_column_becomes_reused_parameter() {
        let table = emp();
        let scopes = [TableScope::new(1, "t1", &table)];
        let mut ctx = DeparseContext::new(&scopes);

        let outer = Expr::column(9, 1, DataType::Int64);
        let expr = Expr::Bool(sqlil::BoolExpr {
            op: BoolOp::And,
            args: vec![
                Expr::binary(id_col(), "=", outer.clone()),
                Expr::binary(Expr::column(1, 4, DataType::Decimal(Default::default())), ">", outer),
            ],
        });

        assert_eq!(
            translate(&expr, &mut ctx),
            Translation::Translated(r#"(("ID" = :p1) AND ("SALARY" > :p1))"#.to_string())
        );
        assert_eq!(ctx.params.len(), 1);
    }

    #[test]
    fn test_rejected_expression_restores_registry() {
        let table = emp();
        let scopes = [TableScope::new(1, "t1", &table)];
        let mut ctx = DeparseContext::new(&scopes);

        let expr = Expr::Bool(sqlil::BoolExpr {
            op: BoolOp::And,
            args: vec![
                Expr::binary(id_col(), "=", Expr::column(9, 1, DataType::Int64)),
                Expr::Unsupported("window function".to_string()),
            ],
        });

        assert_eq!(translate(&expr, &mut ctx), Translation::Rejected);
        assert_eq!(ctx.params.len(), 0);
    }

    #[test]
    fn test_translation_is_deterministic() {
        let expr = Expr::binary(
            Expr::binary(id_col(), "%", Expr::literal(DataValue::Int64(10))),
            "=",
            Expr::literal(DataValue::Int64(3)),
        );

        let a = translate_one(&expr);
        let b = translate_one(&expr);

        assert_eq!(a, b);
        assert_eq!(
            a,
            Translation::Translated(r#"(MOD("ID", 10) = 3)"#.to_string())
        );
    }

    #[test]
    fn test_operator_renames() {
        let pow = Expr::binary(id_col(), "^", Expr::literal(DataValue::Int64(2)));
        let band = Expr::binary(id_col(), "&", Expr::literal(DataValue::Int64(7)));
        let sqrt = Expr::UnaryOp(UnaryOp::new("|/", id_col()));
        let abs = Expr::UnaryOp(UnaryOp::new("@", id_col()));

        assert_eq!(
            translate_one(&pow),
            Translation::Translated(r#"POWER("ID", 2)"#.to_string())
        );
        assert_eq!(
            translate_one(&band),
            Translation::Translated(r#"BITAND("ID", 7)"#.to_string())
        );
        assert_eq!(
            translate_one(&sqrt),
            Translation::Translated(r#"SQRT("ID")"#.to_string())
        );
        assert_eq!(
            translate_one(&abs),
            Translation::Translated(r#"ABS("ID")"#.to_string())
        );
    }

    #[test]
    fn test_case_insensitive_like_wraps_upper() {
        let expr = Expr::binary(
            name_col(),
            "~~*",
            Expr::literal(DataValue::Utf8String("a%".to_string())),
        );

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"(UPPER("NAME") LIKE UPPER('a%'))"#.to_string())
        );
    }

    #[test]
    fn test_non_builtin_operator_is_rejected() {
        let mut op = BinaryOp::new(id_col(), "=", Expr::literal(DataValue::Int64(1)));
        op.builtin = false;

        assert_eq!(translate_one(&Expr::BinaryOp(op)), Translation::Rejected);
    }

    #[test]
    fn test_in_list() {
        let expr = Expr::ArrayComparison(ArrayComparison {
            op: "=".to_string(),
            any: true,
            builtin: true,
            left: Box::new(id_col()),
            elements: ArrayElements::Values {
                r#type: DataType::Int64,
                values: vec![DataValue::Int64(1), DataValue::Int64(2)],
            },
        });

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"("ID" IN (1, 2))"#.to_string())
        );
    }

    #[test]
    fn test_empty_in_list_is_rejected() {
        let expr = Expr::ArrayComparison(ArrayComparison {
            op: "=".to_string(),
            any: true,
            builtin: true,
            left: Box::new(id_col()),
            elements: ArrayElements::Values {
                r#type: DataType::Int64,
                values: vec![],
            },
        });

        assert_eq!(translate_one(&expr), Translation::Rejected);
    }

    #[test]
    fn test_not_in_requires_all_form() {
        let not_in = Expr::ArrayComparison(ArrayComparison {
            op: "<>".to_string(),
            any: false,
            builtin: true,
            left: Box::new(id_col()),
            elements: ArrayElements::Values {
                r#type: DataType::Int64,
                values: vec![DataValue::Int64(1)],
            },
        });
        let ne_any = Expr::ArrayComparison(ArrayComparison {
            op: "<>".to_string(),
            any: true,
            builtin: true,
            left: Box::new(id_col()),
            elements: ArrayElements::Values {
                r#type: DataType::Int64,
                values: vec![DataValue::Int64(1)],
            },
        });

        assert_eq!(
            translate_one(&not_in),
            Translation::Translated(r#"("ID" NOT IN (1))"#.to_string())
        );
        assert_eq!(translate_one(&ne_any), Translation::Rejected);
    }

    #[test]
    fn test_case_with_arg_requires_equality_shape() {
        let good = Expr::Case(Case {
            arg: Some(Box::new(id_col())),
            whens: vec![CaseWhen {
                test: Expr::BinaryOp(BinaryOp::new(
                    Expr::CaseTest(DataType::Int64),
                    "=",
                    Expr::literal(DataValue::Int64(1)),
                )),
                result: Expr::literal(DataValue::Int64(10)),
            }],
            r#else: Some(Box::new(Expr::literal(DataValue::Int64(0)))),
            r#type: DataType::Int64,
        });
        let bad = Expr::Case(Case {
            arg: Some(Box::new(id_col())),
            whens: vec![CaseWhen {
                test: Expr::BinaryOp(BinaryOp::new(
                    Expr::CaseTest(DataType::Int64),
                    "<",
                    Expr::literal(DataValue::Int64(1)),
                )),
                result: Expr::literal(DataValue::Int64(10)),
            }],
            r#else: None,
            r#type: DataType::Int64,
        });

        assert_eq!(
            translate_one(&good),
            Translation::Translated(r#"CASE "ID" WHEN 1 THEN 10 ELSE 0 END"#.to_string())
        );
        assert_eq!(translate_one(&bad), Translation::Rejected);
    }

    #[test]
    fn test_function_renames() {
        let expr = Expr::FunctionCall(FunctionCall::new(
            "ceiling",
            vec![Expr::column(1, 4, DataType::Decimal(Default::default()))],
            DataType::Decimal(Default::default()),
        ));

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"CEIL("SALARY")"#.to_string())
        );

        let expr = Expr::FunctionCall(FunctionCall::new(
            "strpos",
            vec![
                name_col(),
                Expr::literal(DataValue::Utf8String("x".to_string())),
            ],
            DataType::Int32,
        ));

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"INSTR("NAME", 'x')"#.to_string())
        );
    }

    #[test]
    fn test_unlisted_or_qualified_function_is_rejected() {
        let unlisted = Expr::FunctionCall(FunctionCall::new("random", vec![], DataType::Float64));
        let mut qualified = FunctionCall::new("abs", vec![id_col()], DataType::Int64);
        qualified.schema_qualified = true;

        assert_eq!(translate_one(&unlisted), Translation::Rejected);
        assert_eq!(
            translate_one(&Expr::FunctionCall(qualified)),
            Translation::Rejected
        );
    }

    #[test]
    fn test_extract_field_allow_list() {
        let good = Expr::FunctionCall(FunctionCall::new(
            "extract",
            vec![
                Expr::literal(DataValue::Utf8String("year".to_string())),
                Expr::column(1, 5, DataType::Date),
            ],
            DataType::Float64,
        ));
        let bad = Expr::FunctionCall(FunctionCall::new(
            "extract",
            vec![
                Expr::literal(DataValue::Utf8String("epoch".to_string())),
                Expr::column(1, 5, DataType::Date),
            ],
            DataType::Float64,
        ));

        assert_eq!(
            translate_one(&good),
            Translation::Translated(r#"EXTRACT(YEAR FROM "HIRED")"#.to_string())
        );
        assert_eq!(translate_one(&bad), Translation::Rejected);
    }

    #[test]
    fn test_now_family_renders_verbatim_token() {
        let expr = Expr::FunctionCall(FunctionCall::new("now", vec![], DataType::DateTimeWithTZ));

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(
                "CAST(?/*:now*/ AS TIMESTAMP WITH TIME ZONE)".to_string()
            )
        );
    }

    #[test]
    fn test_now_string_cast_via_io() {
        let good = Expr::Cast(Cast {
            expr: Box::new(Expr::literal(DataValue::Utf8String("now".to_string()))),
            r#type: DataType::Date,
            via_io: true,
        });
        let bad = Expr::Cast(Cast {
            expr: Box::new(Expr::literal(DataValue::Utf8String("2024-01-01".to_string()))),
            r#type: DataType::Date,
            via_io: true,
        });

        assert_eq!(
            translate_one(&good),
            Translation::Translated("CAST(?/*:now*/ AS DATE)".to_string())
        );
        assert_eq!(translate_one(&bad), Translation::Rejected);
    }

    #[test]
    fn test_date_literal_renders_midnight_cast() {
        let expr = Expr::binary(
            Expr::column(1, 5, DataType::Date),
            "=",
            Expr::literal(DataValue::Date(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            )),
        );

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(
                r#"("HIRED" = CAST('2024-03-01 00:00:00' AS DATE))"#.to_string()
            )
        );
    }

    #[test]
    fn test_interval_literal_signs_per_magnitude_change() {
        let expr = Expr::literal(DataValue::Interval(IntervalValue::new(14, -3, 0)));

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(
                "(INTERVAL '1' YEAR + INTERVAL '2' MONTH - INTERVAL '3' DAY)".to_string()
            )
        );
    }

    #[test]
    fn test_interval_by_interval_arithmetic_is_rejected() {
        let expr = Expr::binary(
            Expr::literal(DataValue::Interval(IntervalValue::new(1, 0, 0))),
            "+",
            Expr::literal(DataValue::Interval(IntervalValue::new(2, 0, 0))),
        );

        assert_eq!(translate_one(&expr), Translation::Rejected);
    }

    #[test]
    fn test_aggregates_only_in_grouping_context() {
        let count = Expr::Aggregate(Aggregate::count_star());

        assert_eq!(translate_one(&count), Translation::Rejected);

        let table = emp();
        let scopes = [TableScope::new(1, "t1", &table)];
        let mut ctx = DeparseContext::for_grouping(&scopes);

        assert_eq!(
            translate(&count, &mut ctx),
            Translation::Translated("COUNT(*)".to_string())
        );

        let sum = Expr::Aggregate(Aggregate {
            distinct: true,
            ..Aggregate::new(AggFunc::Sum, Expr::column(1, 4, DataType::Decimal(Default::default())))
        });
        assert_eq!(
            translate(&sum, &mut ctx),
            Translation::Translated(r#"SUM(DISTINCT "SALARY")"#.to_string())
        );

        let ordered = Expr::Aggregate(Aggregate {
            has_order_by: true,
            ..Aggregate::new(AggFunc::Max, id_col())
        });
        assert_eq!(translate(&ordered, &mut ctx), Translation::Rejected);
    }

    #[test]
    fn test_explicit_collation_is_rejected() {
        let mut lit = Literal::new(DataValue::Utf8String("x".to_string()));
        lit.collation = Collation::Other("C".to_string());
        let expr = Expr::binary(name_col(), "=", Expr::Literal(lit));

        assert_eq!(translate_one(&expr), Translation::Rejected);
    }

    #[test]
    fn test_multi_scope_columns_are_qualified() {
        let left = emp();
        let right = emp();
        let scopes = [
            TableScope::new(1, "t1", &left),
            TableScope::new(2, "t2", &right),
        ];
        let mut ctx = DeparseContext::new(&scopes);

        let expr = Expr::binary(id_col(), "=", Expr::column(2, 1, DataType::Int64));

        assert_eq!(
            translate(&expr, &mut ctx),
            Translation::Translated(r#"(t1."ID" = t2."ID")"#.to_string())
        );
    }

    #[test]
    fn test_ordering_renders_nulls_placement() {
        let table = emp();
        let scopes = [TableScope::new(1, "t1", &table)];
        let mut ctx = DeparseContext::new(&scopes);

        assert_eq!(
            translate_ordering(&Ordering::asc(id_col()), &mut ctx),
            Translation::Translated(r#""ID" ASC NULLS LAST"#.to_string())
        );
        assert_eq!(
            translate_ordering(&Ordering::desc(id_col()), &mut ctx),
            Translation::Translated(r#""ID" DESC NULLS FIRST"#.to_string())
        );
    }

    #[test]
    fn test_distinct_from_uses_null_safe_compare() {
        let expr = Expr::DistinctFrom(sqlil::DistinctFrom {
            left: Box::new(id_col()),
            right: Box::new(Expr::literal(DataValue::Int64(1))),
            negated: false,
        });

        assert_eq!(
            translate_one(&expr),
            Translation::Translated(r#"(DECODE("ID", 1, 0, 1) = 1)"#.to_string())
        );
    }
}
