mod types;

pub use types::{Actor, AggregateId};
