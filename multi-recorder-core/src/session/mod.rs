pub mod context;
pub mod machine;
pub mod snapshot;
