//! shardql-core: the dynamically-typed value/row model and the pull-based
//! operator contract shared by the shard indexing core (`shardql-index`) and
//! the pipeline query executor (`shardql-exec`).

pub mod error;
pub mod operator;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use operator::{Context, Lifecycle, Operator, Stats};
pub use value::{Row, Value};
