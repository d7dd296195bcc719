//! CLI commands implementation

pub mod index;
pub mod init;
pub mod libraries;
pub mod query;
pub mod reset;
pub mod status;

pub use index::*;
pub use init::*;
pub use libraries::*;
pub use query::*;
pub use reset::*;
pub use status::*;
