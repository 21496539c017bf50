//! Core runtime types: errors, configuration and rope strings.
//!
//! This crate provides the foundational types shared by the bytecode system
//! and the interpreter.
//!
//! # Overview
//!
//! - [`RString`] - Immutable rope string with O(1) concatenation and slicing
//! - [`StringValue`] - Operations every string variant supports
//! - [`RuntimeError`] - Runtime errors with a kind and message
//! - [`ErrorKind`] - Types of runtime errors
//! - [`RuntimeConfig`] - Tunables for one VM instance
//!
//! # Examples
//!
//! ```
//! use core_types::{RString, StringValue};
//! use memory_manager::Heap;
//!
//! let mut heap = Heap::new();
//! let a = RString::from_text(&mut heap, "abc");
//! let b = RString::from_text(&mut heap, "def");
//! let joined = RString::concat(&mut heap, &a, &b);
//! assert_eq!(joined.len(), 6);
//! assert_eq!(joined.char_at(5).unwrap(), u16::from(b'f'));
//!
//! let middle = RString::slice(&mut heap, &joined, 2, 5).unwrap();
//! assert_eq!(middle.to_string(), "cde");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod string;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{ErrorKind, Result, RuntimeError};
pub use string::{RString, StringValue};
