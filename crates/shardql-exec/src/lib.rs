//! shardql-exec: the pipeline query executor (§1, §4.3-§4.7, §4.10).
//!
//! [`expr`] is the literal/field-ref/unary/binary/call expression
//! evaluator (§4.3). [`operators`] holds every streaming, materializing,
//! statistics, and subquery operator from §4.4-§4.7, each implementing
//! [`shardql_core::operator::Operator`]. [`driver`] is the only place a
//! physical plan is turned into a tree of those operators and driven to
//! completion (§4.10): everything upstream of it (the PPL lexer/parser, the
//! logical-to-physical planner) is an external collaborator per §1.

pub mod driver;
pub mod expr;
pub mod operators;

pub use driver::{execute, ManagerShardResolver, Plan, QueryResult, ShardResolver};
pub use expr::{eval, BinaryOp, Expr, UnaryOp};
