// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("protos");

    let proto_files: Vec<PathBuf> = vec!["common.proto", "gcs.proto", "node_manager.proto"]
        .into_iter()
        .map(|p| proto_root.join(p))
        .collect();

    // Fall back to the bundled protoc unless PROTOC is set explicitly.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .build_transport(true)
        // The broadcast payload is encoded once and shared across every raylet.
        .bytes([".ray.rpc.UpdateResourceUsageRequest.serialized_resource_usage_batch"])
        .compile_protos(&proto_files, &[proto_root.clone()])?;

    for proto in &proto_files {
        println!("cargo:rerun-if-changed={}", proto.display());
    }

    Ok(())
}
