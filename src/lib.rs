//! Ferry
//!
//! Point-to-point file transfer over a framed TCP protocol: a
//! length-prefixed binary codec, six typed packets, a receive-side state
//! machine that validates integrity and refuses filesystem escape, and an
//! asynchronous connection engine with a congestion-signalled write queue.

pub mod binary;
pub mod connection;
pub mod frame;
pub mod fs_walk;
pub mod log;
pub mod net;
pub mod packet;
pub mod paths;
pub mod progress;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod writer;
