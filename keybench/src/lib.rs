//! Drives read and write workloads against a storage backend and reports operation latencies.
//!
//! A [`workload`] wires the operations of a [`backend::Backend`] into a
//! [`Plan`](keybench_core::Plan), together with an ID generator shaping the key access pattern:
//! sequential for inserts, uniform for reads across the whole key space, or *zipfian* for reads
//! heavily skewed towards the most recently written records.
//!
//! While running, a status line with the approximate throughput of each operation is printed every
//! second. Once stopped, the latency histogram of every operation is printed and optionally written
//! to a CSV file, see [`report`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod observability;
pub mod record;
pub mod report;
pub mod workload;
