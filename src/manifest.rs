// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;

use crate::config::{ImageConfig, Target};

/// All targets whose tag is missing in their registry, in path order.
pub fn missing_targets(repos: &BTreeMap<PathBuf, ImageConfig>) -> Vec<Target> {
    repos
        .values()
        .flat_map(ImageConfig::targets)
        .filter(|target| target.remote_tag_missing)
        .cloned()
        .collect()
}

/// Renders the `targets=<json>` line consumed by the build matrix.
pub fn render(targets: &[Target]) -> Result<String, anyhow::Error> {
    if targets.is_empty() {
        return Ok("targets=[]".to_string());
    }

    let json = serde_json::to_string(targets).context("cannot serialize targets")?;
    Ok(format!("targets={json}"))
}
