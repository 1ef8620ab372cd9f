use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use serde::{Deserialize, Serialize};
use std::fmt;

type KeyedBlake2b256 = Blake2bMac<U32>;

/// A 32-byte block content signature computed as keyed BLAKE2b-256.
///
/// Two blocks with equal signatures are treated as duplicates by the
/// candidate index; the key is fixed per storage root so signatures stay
/// comparable across backup runs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature(pub [u8; 32]);

impl Signature {
    /// Compute a block signature using keyed BLAKE2b-256 (BLAKE2b-MAC with
    /// 32-byte output).
    pub fn compute(key: &[u8; 32], data: &[u8]) -> Self {
        let mut hasher =
            KeyedBlake2b256::new_from_slice(key).expect("valid 32-byte key for BLAKE2b");
        Mac::update(&mut hasher, data);
        let result = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&result.into_bytes());
        Signature(out)
    }

    /// Hex-encode the full signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
