// CDK-style context overrides (`-c key=value`).
//
// Keys use the camelCase names the CDK app read from cdk.json so existing
// context files and scripts keep working.

use crate::StackConfig;
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

/// One `key=value` pair supplied on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOverride {
    pub key: String,
    pub value: String,
}

impl ContextOverride {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::str::FromStr for ContextOverride {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Context value '{}' must have the form key=value", s))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Context value '{}' has an empty key", s);
        }
        Ok(Self::new(key, value.trim()))
    }
}

pub(crate) const KNOWN_KEYS: &[&str] = &[
    "stackName",
    "account",
    "region",
    "partition",
    "cloudProvider",
    "iamUser",
    "secretsStore",
    "secretName",
    "repoOwner",
    "repoName",
    "ssmParam",
    "tokenConfigStorePath",
    "githubAppId",
    "githubInstId",
    "artifact",
    "schedule",
    "debugEnabled",
];

/// Apply context overrides in order; later pairs win over earlier ones.
pub(crate) fn apply_context(config: &mut StackConfig, overrides: &[ContextOverride]) -> Result<()> {
    for ContextOverride { key, value } in overrides {
        let value = value.clone();
        match key.as_str() {
            "stackName" => config.stack_name = value,
            "account" => config.env.account = Some(value),
            "region" => config.env.region = Some(value),
            "partition" => config.env.partition = value,
            "cloudProvider" => config.rotator.cloud_provider = value,
            "iamUser" => config.rotator.iam_user = value,
            "secretsStore" => config.rotator.secrets_store = value,
            "secretName" => config.rotator.secret_name = value,
            "repoOwner" => config.rotator.repo_owner = value,
            "repoName" => config.rotator.repo_name = value,
            "ssmParam" | "tokenConfigStorePath" => config.rotator.token_config_store_path = value,
            "githubAppId" => config.rotator.github_app_id = value,
            "githubInstId" => config.rotator.github_inst_id = value,
            "artifact" => config.function.artifact = PathBuf::from(value),
            "schedule" => config.schedule.expression = value,
            "debugEnabled" => {
                config.debug.enabled = value
                    .parse::<bool>()
                    .with_context(|| format!("Context debugEnabled expects a bool, got '{}'", value))?
            }
            other => bail!(
                "Unknown context key '{}'. Known keys: {}",
                other,
                KNOWN_KEYS.join(", ")
            ),
        }
    }
    Ok(())
}
