// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! ID generators for tests.

use ray_common::id::NodeID;

/// Create a random NodeID for testing.
pub fn random_node_id() -> NodeID {
    NodeID::from_random()
}

/// A deterministic NodeID whose first byte is `v` and the rest zero.
pub fn node_id(v: u8) -> NodeID {
    let mut data = [0u8; NodeID::SIZE];
    data[0] = v;
    NodeID::from_binary(&data)
}
