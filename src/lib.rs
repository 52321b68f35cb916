//! # conservative-gc
//!
//! A conservative, stop-the-world, mark-and-sweep garbage collector for a
//! single-threaded host.
//!
//! ## Design
//!
//! - **Allocation registry**: a separately chained hash table
//!   ([`registry::AllocationMap`]) keyed by raw heap address, with
//!   prime-sized buckets and load-factor-driven resizing.
//! - **Conservative stack scanning**: every word-aligned value on the call
//!   stack (and inside a managed block's interior) is treated as a
//!   candidate pointer and validated by exact registry membership — the
//!   collector never requires type information from the host.
//! - **Mark-and-sweep**: a depth-first mark phase that marks before
//!   recursing (so cycles terminate without a separate visited set),
//!   followed by a sweep that reclaims every unmarked, non-root record.
//!
//! The driver, [`collector::GarbageCollector`], is the crate's public
//! entry point; [`config::GcConfig`] controls its tuning.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod config;
pub mod prime;
pub mod raw;
pub mod record;
pub mod registry;
pub mod scan;

pub use collector::GarbageCollector;
pub use config::GcConfig;
pub use record::{DtorFn, Tag};
pub use registry::AllocationMap;
