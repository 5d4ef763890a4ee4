// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A tiered ordered-sequence container built on packed, compressible
//! segments.
//!
//! A [`List`] stores heterogeneous values (integers, floats, byte
//! strings) in compact byte-packed segments and transparently promotes
//! itself through three physical layouts as it grows:
//!
//! 1. one segment,
//! 2. two segments,
//! 3. a list of nodes, where interior nodes can be kept LZ4-compressed.
//!
//! The per-segment byte ceiling is picked with a [`FillLevel`]; the
//! number of nodes kept uncompressed at each end is the compression
//! depth. Both are fixed per list at construction.
//!
//! The [`xof`] module contains the companion codec for `f64` series:
//! an XOR-delta bit stream in the style of time-series engines.
//!
//! ```
//! use tiered_list::{FillLevel, List, OwnedValue, Value};
//!
//! let mut list = List::new(FillLevel::new(6), 0);
//!
//! for i in 0..1_000i64 {
//!     list.push_tail(Value::Int(i));
//! }
//! list.push_head(Value::Bytes(b"head"));
//!
//! assert_eq!(1_001, list.len());
//! assert_eq!(Some(OwnedValue::Int(999)), list.get(-1));
//!
//! // Encoding is canonical: digit strings become integers
//! list.push_tail(Value::Bytes(b"42"));
//! assert_eq!(Some(OwnedValue::Int(42)), list.get(-1));
//! ```
//!
//! The container is single-owner and performs no locking; wrap it in a
//! mutex (or keep it thread-local) for cross-thread use.

#![deny(clippy::all, missing_docs, clippy::cargo)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bits;
pub mod coding;
mod compress;
mod error;
mod list;
mod policy;
mod segment;
mod value;
pub mod xof;

pub use compress::CompressionType;
pub use error::{Error, Result};
pub use list::{Direction, Entry, Iter, IterMut, List, Tier};
pub use policy::FillLevel;
pub use segment::Segment;
pub use value::{OwnedValue, Value};
