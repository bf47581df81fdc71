//! CLI command implementations

pub mod check;
pub mod clean;
pub mod config;
pub mod delete;
pub mod get;
pub mod keys;
pub mod set;

pub use check::execute as check;
pub use clean::execute as clean;
pub use config::execute as config;
pub use delete::execute as delete;
pub use get::execute as get;
pub use keys::execute as keys;
pub use set::execute as set;
