pub mod dag_builder;
pub mod snapshot;

pub use dag_builder::build_dag;
pub use snapshot::SnapshotImpl;
