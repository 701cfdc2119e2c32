//! JSON-RPC 2.0 wire shapes: the envelope, the method enum, and the
//! numeric error taxonomy.

pub mod envelope;
pub mod error;
pub mod method;
