//! # vault-agent-fsio
//!
//! Atomic, permission-preserving file materialization (component C2).
//!
//! Every destination write goes through [`AtomicWriter::write`]: the new
//! content is written to a sibling temp file, permissions and ownership are
//! applied, and only then is it renamed into place — so a crash mid-write
//! never leaves a destination holding a partial file.

mod path_safety;
mod writer;

pub use path_safety::{sanitize_fragment, validate_destination};
pub use writer::AtomicWriter;
