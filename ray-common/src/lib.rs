// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Common types for Ray: IDs, Status/Error, Config and runtime wrappers.

pub mod config;
pub mod constants;
pub mod id;
pub mod runtime;
pub mod status;
