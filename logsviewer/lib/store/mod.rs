//! The persistence queue that decouples manifest decoding from database writes.

mod object_store;
mod queue;
mod rate_limiter;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use object_store::*;
pub use queue::*;
pub use rate_limiter::*;
