//! deltabridge: run a VCDIFF (RFC 3284) delta engine over arbitrary
//! `Read` / `Write` / `Read + Seek` streams.
//!
//! The crate provides:
//! - A stream bridge that registers application streams as opaque handles
//!   and serves the engine's read/write/seek callbacks (`bridge`)
//! - The callback-driven engine contract and its VCDIFF engine (`engine`)
//! - The VCDIFF wire format and block matcher the engine is built on
//!   (`vcdiff`, `hash`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use std::io::Cursor;
//! use deltabridge::bridge::{self, Input};
//!
//! let base = b"hello old world".to_vec();
//! let target = b"hello new world".to_vec();
//!
//! let mut delta = Vec::new();
//! bridge::encode(
//!     Input::seekable(&mut Cursor::new(&base)),
//!     Input::reader(&mut &target[..]),
//!     &mut delta,
//! )
//! .unwrap();
//!
//! let mut decoded = Vec::new();
//! bridge::decode(
//!     Input::seekable(&mut Cursor::new(&base)),
//!     Input::reader(&mut &delta[..]),
//!     &mut decoded,
//! )
//! .unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod bridge;
pub mod engine;
pub mod hash;
pub mod io;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use bridge::{Bridge, Error, Input, Operation, decode, encode};
pub use engine::{DeltaEngine, EngineOptions, StreamCallbacks, VcdiffEngine};
