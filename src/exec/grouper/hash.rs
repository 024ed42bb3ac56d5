// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::hash::{BuildHasher, Hash, Hasher};

pub(crate) fn seed_from_hasher<S: BuildHasher>(build_hasher: &S) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    0u8.hash(&mut hasher);
    hasher.finish()
}

/// FNV-1a over the encoded key row. The encoding already canonicalizes
/// floats, so hashing the bytes preserves the grouper's equality contract.
pub(crate) fn hash_bytes_with_seed(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// All NaN bit patterns map to one representative; -0.0 and +0.0 stay apart.
pub(crate) fn canonical_f64_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

pub(crate) fn canonical_f32_bits(value: f32) -> u32 {
    if value.is_nan() {
        f32::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

pub(crate) fn canonical_f16_bits(value: half::f16) -> u16 {
    if value.is_nan() {
        half::f16::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_bits_collapse() {
        let quiet = f64::NAN;
        let payload = f64::from_bits(quiet.to_bits() | 0x1234);
        assert!(payload.is_nan());
        assert_eq!(canonical_f64_bits(quiet), canonical_f64_bits(payload));
    }

    #[test]
    fn signed_zeros_stay_distinct() {
        assert_ne!(canonical_f64_bits(0.0), canonical_f64_bits(-0.0));
        assert_ne!(canonical_f32_bits(0.0), canonical_f32_bits(-0.0));
    }

    #[test]
    fn byte_hash_depends_on_seed() {
        let bytes = b"group key";
        assert_ne!(
            hash_bytes_with_seed(1, bytes),
            hash_bytes_with_seed(2, bytes)
        );
    }
}
