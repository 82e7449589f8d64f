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

use thiserror::Error;

use crate::config::ImageConfig;

/// The first invariant a resolved image config violates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("repo_name not set for {}", .path.display())]
    MissingRepoName { path: PathBuf },

    #[error("repo_tag not set for {}", .path.display())]
    MissingRepoTag { path: PathBuf },

    #[error("targets not set for {} either at the child level or via defaults", .path.display())]
    MissingTargets { path: PathBuf },

    #[error("target_platforms not set for {}", .path.display())]
    MissingTargetPlatforms { path: PathBuf },

    #[error("target_platforms cannot contain empty values for {} index {index}", .path.display())]
    EmptyTargetPlatform { path: PathBuf, index: usize },

    #[error("build_args must have at least one key/value pair when defined for {}", .path.display())]
    EmptyBuildArgs { path: PathBuf },

    #[error("build_args must have no blank values for {} key {key}", .path.display())]
    BlankBuildArg { path: PathBuf, key: String },

    #[error("aws_account_id not set for {} target index {index} and there is no default set", .path.display())]
    MissingAccountId { path: PathBuf, index: usize },

    #[error("aws_region not set for {} target index {index} and there is no default set", .path.display())]
    MissingRegion { path: PathBuf, index: usize },
}

impl ValidationError {
    /// The config key that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingRepoName { .. } => "repo_name",
            Self::MissingRepoTag { .. } => "repo_tag",
            Self::MissingTargets { .. } => "targets",
            Self::MissingTargetPlatforms { .. } | Self::EmptyTargetPlatform { .. } => "target_platforms",
            Self::EmptyBuildArgs { .. } | Self::BlankBuildArg { .. } => "build_args",
            Self::MissingAccountId { .. } => "aws_account_id",
            Self::MissingRegion { .. } => "aws_region",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::MissingRepoName { path }
            | Self::MissingRepoTag { path }
            | Self::MissingTargets { path }
            | Self::MissingTargetPlatforms { path }
            | Self::EmptyTargetPlatform { path, .. }
            | Self::EmptyBuildArgs { path }
            | Self::BlankBuildArg { path, .. }
            | Self::MissingAccountId { path, .. }
            | Self::MissingRegion { path, .. } => path,
        }
    }
}

/// Checks every resolved config and stops at the first violation.
pub fn validate(repos: &BTreeMap<PathBuf, ImageConfig>) -> Result<(), ValidationError> {
    for (path, repo) in repos {
        validate_one(path, repo)?;
    }

    Ok(())
}

fn validate_one(path: &Path, repo: &ImageConfig) -> Result<(), ValidationError> {
    let path = || path.to_path_buf();

    if repo.repo_name().is_empty() {
        return Err(ValidationError::MissingRepoName { path: path() });
    }

    if repo.repo_tag().is_empty() {
        return Err(ValidationError::MissingRepoTag { path: path() });
    }

    if repo.targets().is_empty() {
        return Err(ValidationError::MissingTargets { path: path() });
    }

    if repo.target_platforms.is_empty() {
        return Err(ValidationError::MissingTargetPlatforms { path: path() });
    }

    if let Some(index) = repo.target_platforms.iter().position(String::is_empty) {
        return Err(ValidationError::EmptyTargetPlatform { path: path(), index });
    }

    if let Some(build_args) = &repo.build_args {
        if build_args.is_empty() {
            return Err(ValidationError::EmptyBuildArgs { path: path() });
        }

        if let Some((key, _)) = build_args.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ValidationError::BlankBuildArg {
                path: path(),
                key: key.clone(),
            });
        }
    }

    for (index, target) in repo.targets().iter().enumerate() {
        if target.account_id().or(repo.defaults.account_id()).is_none() {
            return Err(ValidationError::MissingAccountId { path: path(), index });
        }

        if target.region().or(repo.defaults.region()).is_none() {
            return Err(ValidationError::MissingRegion { path: path(), index });
        }
    }

    Ok(())
}
