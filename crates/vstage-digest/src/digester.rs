use std::io::{self, Read, Write};

use blake2::digest::consts::{U20, U32, U48};
use blake2::{Blake2b, Blake2b512};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::algorithm::Algorithm;
use crate::set::DigestSet;

/// Running hash state for one algorithm.
enum HashState {
    Sha512(Sha512),
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
    Blake2b160(Blake2b<U20>),
    Blake2b256(Blake2b<U32>),
    Blake2b384(Blake2b<U48>),
    Blake2b512(Blake2b512),
    Blake3(Box<blake3::Hasher>),
}

impl HashState {
    fn new(alg: Algorithm) -> Self {
        match alg {
            Algorithm::Sha512 => Self::Sha512(Sha512::new()),
            Algorithm::Sha256 => Self::Sha256(Sha256::new()),
            Algorithm::Sha1 => Self::Sha1(Sha1::new()),
            Algorithm::Md5 => Self::Md5(Md5::new()),
            Algorithm::Blake2b160 => Self::Blake2b160(Blake2b::new()),
            Algorithm::Blake2b256 => Self::Blake2b256(Blake2b::new()),
            Algorithm::Blake2b384 => Self::Blake2b384(Blake2b::new()),
            Algorithm::Blake2b512 => Self::Blake2b512(Blake2b512::new()),
            Algorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha512(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Md5(h) => h.update(data),
            Self::Blake2b160(h) => h.update(data),
            Self::Blake2b256(h) => h.update(data),
            Self::Blake2b384(h) => h.update(data),
            Self::Blake2b512(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha512(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Blake2b160(h) => hex::encode(h.finalize()),
            Self::Blake2b256(h) => hex::encode(h.finalize()),
            Self::Blake2b384(h) => hex::encode(h.finalize()),
            Self::Blake2b512(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => hex::encode(h.finalize().as_bytes()),
        }
    }
}

/// Computes several digests over one byte stream.
///
/// Feed bytes with [`update`](Self::update) or through the [`Write`] impl,
/// then call [`finalize`](Self::finalize). Duplicate algorithms are ignored.
pub struct MultiDigester {
    states: Vec<(Algorithm, HashState)>,
}

impl MultiDigester {
    /// Create a digester for the given algorithms.
    pub fn new(algorithms: &[Algorithm]) -> Self {
        let mut states: Vec<(Algorithm, HashState)> = Vec::with_capacity(algorithms.len());
        for &alg in algorithms {
            if states.iter().any(|(a, _)| *a == alg) {
                continue;
            }
            states.push((alg, HashState::new(alg)));
        }
        Self { states }
    }

    /// The algorithms this digester computes, in construction order.
    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.states.iter().map(|(alg, _)| *alg)
    }

    /// Update every algorithm with `data`.
    pub fn update(&mut self, data: &[u8]) {
        for (_, state) in &mut self.states {
            state.update(data);
        }
    }

    /// Finish and return lower-case hex digests keyed by algorithm.
    pub fn finalize(self) -> DigestSet {
        let mut set = DigestSet::new();
        for (alg, state) in self.states {
            set.insert(alg, state.finalize_hex());
        }
        set
    }
}

impl Write for MultiDigester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Digest everything `reader` yields. Returns the digests and the byte count.
pub fn digest_reader<R: Read>(
    reader: &mut R,
    algorithms: &[Algorithm],
) -> io::Result<(DigestSet, u64)> {
    let mut digester = MultiDigester::new(algorithms);
    let size = io::copy(reader, &mut digester)?;
    Ok((digester.finalize(), size))
}
