//! The canonical record store: a SQLite database with one table per resource kind.

mod db;
mod ledger;
mod list;
mod queries;
mod records;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use db::*;
pub use ledger::*;
pub use list::*;
pub use queries::*;
pub use records::*;
