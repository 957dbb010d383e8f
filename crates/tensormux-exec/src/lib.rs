//! Batched execution path for one loaded model: pack many requests into one
//! contiguous tensor per input, run the engine once, and scatter the output
//! tensors back into each request's response buffers, isolating per-request
//! faults from the rest of the batch.

mod assemble;
mod scatter;

pub mod context;
pub mod error;
pub mod payload;
pub mod pool;

pub use context::*;
pub use error::*;
pub use payload::*;
pub use pool::*;
