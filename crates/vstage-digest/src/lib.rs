//! Digest engine for vstage.
//!
//! Computes one or more named digests over a byte stream in a single pass.
//! Every algorithm is updated from the same buffer, so a file is read once no
//! matter how many digests are requested.
//!
//! All algorithms wrap established implementations (RustCrypto, BLAKE3).

pub mod algorithm;
pub mod digester;
pub mod error;
pub mod set;

pub use algorithm::Algorithm;
pub use digester::{digest_reader, MultiDigester};
pub use error::DigestError;
pub use set::DigestSet;
