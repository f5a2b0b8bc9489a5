//! # magring Throughput Harness
//!
//! Streams a fixed amount of pseudo-random lowercase text from a producer
//! process to a consumer process through one ring, each on its own thread,
//! and times it:
//!
//! ```text
//!   producer thread                       consumer thread
//!  ┌────────────────┐    "magic!" ring   ┌────────────────┐
//!  │ Lcg(send_seed) │ ─────────────────> │ Lcg(data_seed) │
//!  │ Lcg(data_seed) │   16 pages + book  │  verify bytes  │
//!  └────────────────┘                    └────────────────┘
//! ```
//!
//! Both sides run the same data generator, so the consumer checks every
//! byte without any side channel.

pub mod lcg;
pub mod process;
pub mod workload;

pub use lcg::Lcg;
pub use process::HostSys;
pub use workload::{run, BenchConfig, Report};
