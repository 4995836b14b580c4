//! Configuration types and defaults.

mod defaults;
mod logsviewer;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use logsviewer::*;
