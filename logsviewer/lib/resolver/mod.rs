//! The correlation resolver: rebuilds the relations between independently stored snapshots at
//! query time.

mod correlate;
mod query;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use correlate::*;
pub use query::*;
