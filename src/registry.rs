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

use std::future::Future;

use anyhow::{anyhow, Context};
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecr::types::{ListImagesFilter, TagStatus};
use tracing::debug;

use crate::config::Target;

pub const APP_NAME: &str = "ecr-image-checker";

/// One page of a "list tagged images" call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagPage {
    pub tags: Vec<Option<String>>,
    pub next_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListRequest {
    pub repository_name: String,
    /// Only set when no role is assumed, otherwise the caller's own registry is listed.
    pub registry_id: Option<String>,
    pub next_token: Option<String>,
}

pub trait TagLister: Send + Sync {
    fn list_tagged_images(&self, request: ListRequest) -> impl Future<Output = anyhow::Result<TagPage>> + Send;
}

/// Builds a registry client whose credentials are scoped to exactly one target.
pub trait Connector: Send + Sync + 'static {
    type Client: TagLister;

    fn connect(&self, target: &Target) -> impl Future<Output = anyhow::Result<Self::Client>> + Send;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EcrConnector;

#[derive(Debug)]
pub struct EcrClient {
    ecr: aws_sdk_ecr::Client,
}

impl Connector for EcrConnector {
    type Client = EcrClient;

    async fn connect(&self, target: &Target) -> anyhow::Result<EcrClient> {
        let region = Region::new(
            target
                .region()
                .ok_or_else(|| anyhow!("target {} has no region", target.full_image_ref))?
                .to_owned(),
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());

        // the role name may be set to "" on purpose to opt out of a default role
        if target.aws_role_arn.is_empty() {
            debug!(image = %target.full_image_ref, "no role to assume, using default credential chain");
        } else {
            debug!(role = %target.aws_role_arn, image = %target.full_image_ref, "assuming role");
            let provider = AssumeRoleProvider::builder(target.aws_role_arn.clone())
                .session_name(APP_NAME)
                .region(region)
                .build()
                .await;
            loader = loader.credentials_provider(provider);
        }

        let sdk_config = loader.load().await;
        Ok(EcrClient {
            ecr: aws_sdk_ecr::Client::new(&sdk_config),
        })
    }
}

impl TagLister for EcrClient {
    async fn list_tagged_images(&self, request: ListRequest) -> anyhow::Result<TagPage> {
        let output = self
            .ecr
            .list_images()
            .repository_name(&request.repository_name)
            .filter(ListImagesFilter::builder().tag_status(TagStatus::Tagged).build())
            .set_registry_id(request.registry_id)
            .set_next_token(request.next_token)
            .send()
            .await
            .with_context(|| format!("ListImages failed for repository {}", request.repository_name))?;

        Ok(TagPage {
            tags: output
                .image_ids()
                .iter()
                .map(|id| id.image_tag().map(str::to_owned))
                .collect(),
            next_token: output.next_token().map(str::to_owned),
        })
    }
}
