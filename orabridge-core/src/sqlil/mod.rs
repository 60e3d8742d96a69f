// SQLIL == SQL Intermediate Language
// A closed expression AST covering the node kinds the host planner can hand
// to the connector. The deparser decides per node whether it can be rendered
// in the remote dialect; anything it cannot is evaluated locally instead.

mod expr;

pub use expr::*;
