//! Decoders for 802.11 information elements carried (base64-encoded) in wifi
//! scan entries. Only the operation elements needed for aggregation matching
//! are decoded; no frame parsing happens here.

mod ht;
mod vht;

pub use ht::HtOperation;
pub use vht::VhtOperation;
