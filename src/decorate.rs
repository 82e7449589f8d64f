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
use std::path::{Path, PathBuf};

use crate::config::ImageConfig;

/// Fills in the calculated target fields. Expects validated input.
pub fn decorate(repos: &mut BTreeMap<PathBuf, ImageConfig>) {
    for (path, repo) in repos.iter_mut() {
        let working_directory = working_directory(path);
        let target_platforms = repo.target_platforms.join(",");
        let build_args = repo
            .build_args
            .iter()
            .flatten()
            .map(|(key, value)| format!("--build-arg {key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        let repo_name = repo.repo_name.clone().unwrap_or_default();
        let repo_tag = repo.repo_tag.clone().unwrap_or_default();
        let defaults = repo.defaults.clone();

        for target in repo.targets.iter_mut().flatten() {
            let account_id = target
                .account_id()
                .or(defaults.account_id())
                .unwrap_or_default()
                .to_owned();
            let region = target.region().or(defaults.region()).unwrap_or_default().to_owned();

            target.aws_role_arn = match target.role_name() {
                Some(role_name) => format!("arn:aws:iam::{account_id}:role/{role_name}"),
                None => String::new(),
            };
            target.full_image_ref = format!("{account_id}.dkr.ecr.{region}.amazonaws.com/{repo_name}:{repo_tag}");
            target.working_directory.clone_from(&working_directory);
            target.target_platforms_str.clone_from(&target_platforms);
            target.build_args_str.clone_from(&build_args);
        }
    }
}

fn working_directory(path: &Path) -> String {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.display().to_string(),
        _ => ".".to_string(),
    }
}
