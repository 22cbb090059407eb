//! CLI command implementations
//!
//! Commands are generic over the backend, so the same code drives the
//! spidev backend and the simulated bus.

mod info;
mod list;
mod transfer;

pub use info::run_info;
pub use list::list_backends;
pub use transfer::{run_read, run_transfer, run_write};
