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

use tracing::debug;

use crate::config::{Defaults, ImageConfig, Target};

/// Merges the defaults into one image config.
///
/// Resolution never fails. Gaps that the defaults cannot fill are left in
/// place and reported by [`crate::validate::validate`].
pub fn resolve(defaults: &Defaults, mut child: ImageConfig) -> ImageConfig {
    let repo = child.repo_name.clone().unwrap_or_default();

    for target in child.targets.iter_mut().flatten() {
        if target.account_id().is_none() {
            if let Some(account_id) = defaults.account_id() {
                debug!(repo = %repo, aws_account_id = account_id, "using default value");
                target.aws_account_id = Some(account_id.to_owned());
            }
        }

        if target.region().is_none() {
            if let Some(region) = defaults.region() {
                debug!(repo = %repo, aws_region = region, "using default value");
                target.aws_region = Some(region.to_owned());
            }
        }

        // an explicit empty role name switches role assumption off for this target
        if target.aws_role_name.is_none() {
            if let Some(role_name) = defaults.role_name() {
                debug!(repo = %repo, aws_role_name = role_name, "using default value");
                target.aws_role_name = Some(role_name.to_owned());
            }
        }
    }

    if child.targets().is_empty() {
        if let (Some(account_id), Some(region)) = (defaults.account_id(), defaults.region()) {
            debug!(repo = %repo, aws_account_id = account_id, aws_region = region, "no targets given, using defaults");
            child.targets = Some(vec![Target {
                aws_account_id: Some(account_id.to_owned()),
                aws_region: Some(region.to_owned()),
                aws_role_name: defaults.role_name().map(str::to_owned),
                ..Target::default()
            }]);
        }
    }

    child.defaults = defaults.clone();
    child
}

pub fn resolve_all(defaults: &Defaults, repos: BTreeMap<PathBuf, ImageConfig>) -> BTreeMap<PathBuf, ImageConfig> {
    repos
        .into_iter()
        .map(|(path, child)| (path, resolve(defaults, child)))
        .collect()
}
