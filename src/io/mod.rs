//! Dataset serialization for rank-to-rank transport.

pub mod marshal;

pub use marshal::{marshal, unmarshal, MarshalEnvelope};
