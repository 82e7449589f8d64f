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
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CHILD_CONFIG_FILE: &str = "config.yml";

/// Fallback values shared by every image, read from the defaults file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Defaults {
    pub default_aws_account_id: Option<String>,
    pub default_aws_region: Option<String>,
    pub default_aws_role_name: Option<String>,
}

impl Defaults {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        read_yaml(path).with_context(|| format!("cannot load defaults file {}", path.display()))
    }

    pub fn account_id(&self) -> Option<&str> {
        non_empty(self.default_aws_account_id.as_deref())
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(self.default_aws_region.as_deref())
    }

    pub fn role_name(&self) -> Option<&str> {
        non_empty(self.default_aws_role_name.as_deref())
    }
}

/// The contents of one `config.yml` inside an image directory.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ImageConfig {
    pub repo_name: Option<String>,
    pub repo_tag: Option<String>,
    #[serde(default)]
    pub target_platforms: Vec<String>,
    pub build_args: Option<BTreeMap<String, String>>,
    pub targets: Option<Vec<Target>>,

    // copied in during resolution, used as a fallback by validation
    #[serde(skip)]
    pub defaults: Defaults,
}

impl ImageConfig {
    /// Reads an image config. A file that does not exist yields `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, anyhow::Error> {
        match read_yaml(path) {
            Ok(config) => Ok(Some(config)),
            Err(err) => match err.downcast_ref::<std::io::Error>() {
                Some(io_err) if io_err.kind() == ErrorKind::NotFound => Ok(None),
                _ => Err(err.context(format!("cannot load image config {}", path.display()))),
            },
        }
    }

    pub fn repo_name(&self) -> &str {
        self.repo_name.as_deref().unwrap_or_default()
    }

    pub fn repo_tag(&self) -> &str {
        self.repo_tag.as_deref().unwrap_or_default()
    }

    pub fn targets(&self) -> &[Target] {
        self.targets.as_deref().unwrap_or_default()
    }
}

/// One account/region (and optionally role) an image has to exist in.
///
/// Only the `aws_*` keys come from YAML. Everything else is calculated
/// before the target is written into the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub aws_account_id: Option<String>,
    pub aws_region: Option<String>,
    pub aws_role_name: Option<String>,

    #[serde(default, skip_deserializing)]
    pub aws_role_arn: String,
    #[serde(default, skip_deserializing)]
    pub full_image_ref: String,
    #[serde(default, skip_deserializing)]
    pub remote_tag_missing: bool,
    #[serde(default, skip_deserializing)]
    pub working_directory: String,
    #[serde(default, skip_deserializing, rename = "target_platforms")]
    pub target_platforms_str: String,
    #[serde(default, skip_deserializing, rename = "build_args")]
    pub build_args_str: String,
}

impl Target {
    pub fn account_id(&self) -> Option<&str> {
        non_empty(self.aws_account_id.as_deref())
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(self.aws_region.as_deref())
    }

    pub fn role_name(&self) -> Option<&str> {
        non_empty(self.aws_role_name.as_deref())
    }
}

/// Finds `config.yml` in every non-hidden sub-directory of `image_dir`.
pub fn discover(image_dir: &Path) -> Result<BTreeMap<PathBuf, ImageConfig>, anyhow::Error> {
    info!(path = %image_dir.display(), "base image directory");

    let entries = fs::read_dir(image_dir).with_context(|| format!("cannot read directory {}", image_dir.display()))?;

    let mut repos = BTreeMap::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("cannot read directory entry in {}", image_dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("cannot stat {}", entry.path().display()))?;
        if !file_type.is_dir() || entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let config_path = clean(image_dir).join(entry.file_name()).join(CHILD_CONFIG_FILE);
        match ImageConfig::load(&config_path)? {
            Some(config) => {
                info!(path = %config_path.display(), "found image config");
                repos.insert(config_path, config);
            },
            None => warn!(path = %config_path.display(), "skipping directory without image config"),
        }
    }

    Ok(repos)
}

/// Drops `.` components, so `./image-1` becomes `image-1`.
fn clean(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

// An empty or comment-only document is a config with every key unset.
fn read_yaml<T: DeserializeOwned + Default + 'static>(path: &Path) -> Result<T, anyhow::Error> {
    let content = fs::read_to_string(path)?;
    if content
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
    {
        return Ok(T::default());
    }

    let config: Option<T> =
        serde_yml::from_str(&content).with_context(|| format!("cannot parse yaml file {}", path.display()))?;
    Ok(config.unwrap_or_default())
}

pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const CHILD: &str = "
repo_name: repo-1
repo_tag: alpine
target_platforms:
  - linux/arm64
  - linux/amd64
build_args:
  key: value
targets:
  - aws_account_id: \"077439031059\"
  - aws_region: ap-northeast-1
    aws_role_name: \"\"
";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn load_image_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHILD_CONFIG_FILE);
        write(&path, CHILD);

        let config = ImageConfig::load(&path).unwrap().unwrap();
        assert_eq!(config.repo_name(), "repo-1");
        assert_eq!(config.repo_tag(), "alpine");
        assert_eq!(config.target_platforms, vec!["linux/arm64", "linux/amd64"]);
        assert_eq!(config.build_args.as_ref().unwrap()["key"], "value");

        let targets = config.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].account_id(), Some("077439031059"));
        assert_eq!(targets[0].aws_region, None);
        assert_eq!(targets[1].region(), Some("ap-northeast-1"));
        // explicitly empty is kept as such, it is not the same as absent
        assert_eq!(targets[1].aws_role_name.as_deref(), Some(""));
        assert_eq!(targets[1].role_name(), None);
    }

    #[test]
    fn calculated_fields_are_not_read_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHILD_CONFIG_FILE);
        write(
            &path,
            "repo_name: a\ntargets:\n  - aws_region: eu-west-1\n    full_image_ref: injected\n    remote_tag_missing: true\n",
        );

        let config = ImageConfig::load(&path).unwrap().unwrap();
        assert_eq!(config.targets()[0].full_image_ref, "");
        assert!(!config.targets()[0].remote_tag_missing);
    }

    #[test]
    fn missing_image_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ImageConfig::load(&dir.path().join("nope.yml")).unwrap(), None);
    }

    #[test]
    fn malformed_image_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHILD_CONFIG_FILE);
        write(&path, "repo_name: [unterminated");

        let err = ImageConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains(CHILD_CONFIG_FILE));
    }

    #[test]
    fn load_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-defaults.yml");
        write(
            &path,
            "default_aws_account_id: \"111111111111\"\ndefault_aws_region: eu-west-3\ndefault_aws_role_name: \"\"\n",
        );

        let defaults = Defaults::load(&path).unwrap();
        assert_eq!(defaults.account_id(), Some("111111111111"));
        assert_eq!(defaults.region(), Some("eu-west-3"));
        assert_eq!(defaults.role_name(), None);
    }

    #[test]
    fn empty_defaults_file_has_no_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-defaults.yml");

        write(&path, "");
        assert_eq!(Defaults::load(&path).unwrap(), Defaults::default());

        write(&path, "# default_aws_account_id: \"1\"\n\n# default_aws_region: eu-west-1\n");
        assert_eq!(Defaults::load(&path).unwrap(), Defaults::default());
    }

    #[test]
    fn empty_image_config_loads_as_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHILD_CONFIG_FILE);
        write(&path, "---\n# nothing here yet\n");

        assert_eq!(ImageConfig::load(&path).unwrap(), Some(ImageConfig::default()));
    }

    #[test]
    fn clean_drops_current_dir_components() {
        assert_eq!(clean(Path::new(".")), PathBuf::new());
        assert_eq!(clean(Path::new(".")).join("image-1").join(CHILD_CONFIG_FILE), PathBuf::from("image-1/config.yml"));
        assert_eq!(clean(Path::new("./images")), PathBuf::from("images"));
        assert_eq!(clean(Path::new("/srv/images")), PathBuf::from("/srv/images"));
    }

    #[test]
    fn missing_defaults_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Defaults::load(&dir.path().join("config-defaults.yml")).is_err());
    }

    #[test]
    fn discover_skips_files_hidden_dirs_and_dirs_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("image-1").join(CHILD_CONFIG_FILE), CHILD);
        write(&root.join("image-2").join(CHILD_CONFIG_FILE), "repo_name: image-2\nrepo_tag: \"2\"\n");
        write(&root.join(".github").join(CHILD_CONFIG_FILE), CHILD);
        write(&root.join("image-3").join("Dockerfile"), "FROM scratch\n");
        write(&root.join("README.md"), "# images\n");

        let repos = discover(root).unwrap();
        let keys: Vec<_> = repos.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                root.join("image-1").join(CHILD_CONFIG_FILE),
                root.join("image-2").join(CHILD_CONFIG_FILE),
            ]
        );
        assert_eq!(repos[&keys[1]].targets, None);
    }

    #[test]
    fn discover_fails_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("image-1").join(CHILD_CONFIG_FILE), "targets: {");

        assert!(discover(dir.path()).is_err());
    }
}
