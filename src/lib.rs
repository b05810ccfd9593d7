//! Parse untrusted DNS wire packets into a deduplicated, decompressed,
//! owned form suitable for caching, and rebuild packets from that form
//! with outgoing name compression.
//!
//! The first pass groups records into sets while only holding offsets into
//! the caller's packet; the second pass materializes owned data. DNSSEC
//! signatures are folded onto the sets they cover, but never validated.

pub mod arena;
pub mod compress;
pub mod constants;
pub mod dname;
pub mod errors;
pub mod msg_parse;
pub mod parse;
pub mod rdata;
pub mod reply;
pub mod serialize;
pub mod wire;

pub use crate::arena::*;
pub use crate::compress::*;
pub use crate::constants::*;
pub use crate::dname::*;
pub use crate::errors::*;
pub use crate::msg_parse::*;
pub use crate::parse::*;
pub use crate::rdata::*;
pub use crate::reply::*;
pub use crate::serialize::*;
pub use crate::wire::*;
