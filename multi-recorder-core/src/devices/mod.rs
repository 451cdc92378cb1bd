pub mod aggregate;
pub mod directory;
