//! svndiff codec and delta generation for chronofs
//!
//! This crate implements svndiff version 0: the window model with its
//! three instruction forms, the stream encoder and decoder, and a
//! block-match generator that turns a (source, target) pair of fulltexts
//! into windows.
//!
//! The storage layer stores each encoded window in its own string-store
//! blob (header stripped) and records one delta chunk per window; the
//! transaction engine decodes editor-supplied svndiff streams and pipes
//! the reconstructed text into file write streams.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod window;
pub mod xdelta;

pub use codec::{
    decode_stream, decode_window, encode_stream, encode_window, read_varint, write_varint,
    SVNDIFF_HEADER,
};
pub use window::{DeltaOp, DeltaWindow};
pub use xdelta::diff_windows;
