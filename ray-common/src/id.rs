// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Ray ID types, byte-for-byte compatible with the IDs raylets exchange.
//!
//! Only `NodeID` is needed here. It keys the broadcaster's membership
//! table and the raylet client pool.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::constants::UNIQUE_ID_SIZE;

// ─── MurmurHash64A ──────────────────────────────────────────────────────────
// Must stay bit-identical to the raylet's ID hash.

fn murmur_hash_64a(key: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: i32 = 47;

    let len = key.len();
    let mut h: u64 = seed ^ ((len as u64).wrapping_mul(M));

    let mut chunks = key.chunks_exact(8);
    for chunk in &mut chunks {
        let mut block = [0u8; 8];
        block.copy_from_slice(chunk);
        let mut k = u64::from_le_bytes(block);

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, byte) in tail.iter().enumerate().rev() {
            h ^= (*byte as u64) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

/// Generates a fixed-size, nil-by-default Ray ID newtype.
macro_rules! define_ray_id {
    ($name:ident, $size:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            data: [u8; $size],
        }

        impl $name {
            pub const SIZE: usize = $size;

            /// The nil ID is all 0xFF bytes.
            pub const fn nil() -> Self {
                Self {
                    data: [0xFF; $size],
                }
            }

            /// Build an ID from wire bytes, `None` unless exactly `SIZE` long.
            pub fn try_from_binary(bytes: &[u8]) -> Option<Self> {
                let data: [u8; $size] = bytes.try_into().ok()?;
                Some(Self { data })
            }

            /// Like [`Self::try_from_binary`] but panics on a size mismatch.
            /// For bytes that are known to be well formed.
            pub fn from_binary(bytes: &[u8]) -> Self {
                match Self::try_from_binary(bytes) {
                    Some(id) => id,
                    None => panic!(
                        "expected {} bytes for {}, got {}",
                        $size,
                        stringify!($name),
                        bytes.len()
                    ),
                }
            }

            /// Parse a hex string, falling back to nil on malformed input.
            pub fn from_hex(hex_str: &str) -> Self {
                let parsed = hex::decode(hex_str)
                    .ok()
                    .and_then(|bytes| Self::try_from_binary(&bytes));
                parsed.unwrap_or_else(|| {
                    tracing::error!(hex = hex_str, "invalid hex string for {}", stringify!($name));
                    Self::nil()
                })
            }

            pub fn from_random() -> Self {
                let mut data = [0u8; $size];
                ray_util::random::fill_random(&mut data);
                Self { data }
            }

            pub fn is_nil(&self) -> bool {
                self.data == [0xFF; $size]
            }

            /// Owned copy of the bytes, as carried in proto `bytes` fields.
            pub fn binary(&self) -> Vec<u8> {
                self.data.to_vec()
            }

            pub fn hex(&self) -> String {
                hex::encode(self.data)
            }

            pub fn murmur_hash(&self) -> u64 {
                murmur_hash_64a(&self.data, 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.murmur_hash().hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.hex())
            }
        }
    };
}

define_ray_id!(NodeID, UNIQUE_ID_SIZE);
