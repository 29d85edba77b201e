//! Query specification compiler — descriptors, compilation, execution,
//! tabular results.

pub mod compile;
pub mod descriptor;
pub mod exec;
pub mod frame;

pub use compile::{compile, QueryPlan};
pub use descriptor::{
    AggregateOp, GroupOp, Grouping, Predicate, Projection, QueryDescriptor, ResultShape, Selection,
};
pub use exec::{run, QueryOutput};
pub use frame::Frame;
