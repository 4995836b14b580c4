//! Must-gather ingestion: extraction, layout discovery, manifest decoding and enqueueing.

mod archive;
mod enrichment;
mod layout;
mod pipeline;
mod timestamp;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use archive::*;
pub use enrichment::*;
pub use layout::*;
pub use pipeline::*;
pub use timestamp::*;
