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
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::{ImageConfig, Target};
use crate::registry::{Connector, ListRequest, TagLister};

/// Pages through the tagged images of `repo_name` until `repo_tag` shows up.
///
/// Returns `true` only when the whole listing was read without finding the
/// tag. Any failed call is returned as an error.
pub async fn remote_tag_missing<C: TagLister>(
    client: &C,
    target: &Target,
    repo_name: &str,
    repo_tag: &str,
) -> anyhow::Result<bool> {
    // without a role the default chain lists the caller's own registry
    let registry_id = if target.aws_role_arn.is_empty() {
        target.account_id().map(str::to_owned)
    } else {
        None
    };
    if let Some(registry_id) = &registry_id {
        debug!(registry = %registry_id, "no role assumed, scoping list call to registry");
    }

    let mut next_token = None;
    loop {
        let page = client
            .list_tagged_images(ListRequest {
                repository_name: repo_name.to_owned(),
                registry_id: registry_id.clone(),
                next_token: next_token.take(),
            })
            .await
            .with_context(|| format!("listing image tags for {repo_name}"))?;

        if page.tags.iter().any(|tag| tag.as_deref() == Some(repo_tag)) {
            debug!(repo = repo_name, tag = repo_tag, "found image tag");
            return Ok(false);
        }

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => return Ok(true),
        }
    }
}

/// Checks every target of every image, one task per target.
///
/// The first failing target aborts the run and the remaining tasks are
/// cancelled.
pub async fn check_all<C: Connector>(
    connector: Arc<C>,
    repos: &mut BTreeMap<PathBuf, ImageConfig>,
) -> anyhow::Result<()> {
    let mut join_set = JoinSet::new();

    for (path, repo) in repos.iter() {
        for (idx, target) in repo.targets().iter().enumerate() {
            let connector = Arc::clone(&connector);
            let path = path.clone();
            let target = target.clone();
            let repo_name = repo.repo_name().to_owned();
            let repo_tag = repo.repo_tag().to_owned();

            join_set.spawn(async move {
                let client = connector
                    .connect(&target)
                    .await
                    .with_context(|| format!("setting up registry client for {}", target.full_image_ref))?;
                let missing = remote_tag_missing(&client, &target, &repo_name, &repo_tag)
                    .await
                    .with_context(|| format!("checking {}", target.full_image_ref))?;
                Ok::<_, anyhow::Error>((path, idx, missing))
            });
        }
    }

    while let Some(res) = join_set.join_next().await {
        let (path, idx, missing) = res??;
        if let Some(target) = repos
            .get_mut(&path)
            .and_then(|repo| repo.targets.as_mut())
            .and_then(|targets| targets.get_mut(idx))
        {
            target.remote_tag_missing = missing;
        }
    }

    Ok(())
}
