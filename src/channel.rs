//! Backpressure primitives: the byte-size estimate carried by block data and the
//! count- and byte-bounded channel used between catch-up fetching and processing.

pub mod bounded;
pub mod byte_size;

pub use bounded::{BoundedChannel, RecvError, SendError, BYTES_PER_MEGABYTE};
pub use byte_size::ByteSize;
