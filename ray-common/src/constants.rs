// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Shared constants.

/// Length of Ray full-length UniqueIDs in bytes.
pub const UNIQUE_ID_SIZE: usize = 28;

/// Name of the thread that runs the GCS resource report broadcast loop.
pub const RESOURCE_REPORT_BROADCAST_THREAD_NAME: &str = "resource_report_broadcaster";
