pub mod env;

pub use env::{ConnectionParams, DbKind, EnvRegistry, Environment};
