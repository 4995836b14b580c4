//! Typed views of the Kubernetes, KubeVirt and OLM manifests found in a must-gather archive.
//!
//! Every manifest is first decoded into an untyped JSON value, which is kept verbatim as the
//! record's opaque content, and then into one of the views below to compute summary fields.

mod decode;
mod kube;
mod kubevirt;
mod meta;
mod olm;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use decode::*;
pub use kube::*;
pub use kubevirt::*;
pub use meta::*;
pub use olm::*;
