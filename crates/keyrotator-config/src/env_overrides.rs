use crate::{LogFormat, Runtime, StackConfig};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "KEYROTATOR_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Get an environment variable with the KEYROTATOR_ prefix prepended
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the KEYROTATOR_ prefix
    /// Used for CDK/AWS standard variables (CDK_DEFAULT_ACCOUNT, AWS_REGION)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Apply environment-variable overrides to the stack config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut StackConfig, env: &E) -> Result<()> {
    if let Some(name) = env.get("STACK_NAME") {
        config.stack_name = name;
    }

    // Target environment. Prefixed values win; CDK and AWS standard variables
    // only fill gaps the config file left open.
    if let Some(account) = env.get("ACCOUNT") {
        config.env.account = Some(account);
    } else if config.env.account.is_none() {
        config.env.account = env.get_raw("CDK_DEFAULT_ACCOUNT");
    }
    if let Some(region) = env.get("REGION") {
        config.env.region = Some(region);
    } else if config.env.region.is_none() {
        config.env.region = env
            .get_raw("CDK_DEFAULT_REGION")
            .or_else(|| env.get_raw("AWS_REGION"));
    }
    if let Some(partition) = env.get("PARTITION") {
        config.env.partition = partition;
    }

    // Rotator settings
    let rotator = &mut config.rotator;
    let string_overrides: [(&str, &mut String); 9] = [
        ("CLOUD_PROVIDER", &mut rotator.cloud_provider),
        ("IAM_USER", &mut rotator.iam_user),
        ("SECRETS_STORE", &mut rotator.secrets_store),
        ("SECRET_NAME", &mut rotator.secret_name),
        ("REPO_OWNER", &mut rotator.repo_owner),
        ("REPO_NAME", &mut rotator.repo_name),
        ("TOKEN_CONFIG_STORE_PATH", &mut rotator.token_config_store_path),
        ("GITHUB_APP_ID", &mut rotator.github_app_id),
        ("GITHUB_INST_ID", &mut rotator.github_inst_id),
    ];
    for (key, slot) in string_overrides {
        if let Some(value) = env.get(key) {
            *slot = value;
        }
    }

    // Function
    if let Some(runtime) = env.get("RUNTIME") {
        config.function.runtime = runtime
            .parse::<Runtime>()
            .context("Invalid KEYROTATOR_RUNTIME value")?;
    }
    if let Some(handler) = env.get("HANDLER") {
        config.function.handler = handler;
    }
    if let Some(artifact) = env.get("ARTIFACT") {
        config.function.artifact = PathBuf::from(artifact);
    }
    if let Some(val) = get_env_u32(env, "MEMORY_SIZE")? {
        config.function.memory_size = Some(val);
    }
    if let Some(val) = get_env_u32(env, "TIMEOUT_SECS")? {
        config.function.timeout_secs = Some(val);
    }

    if let Some(val) = get_env_bool(env, "DEBUG_ENABLED")? {
        config.debug.enabled = val;
    }

    if let Some(expression) = env.get("SCHEDULE") {
        config.schedule.expression = expression;
    }

    if let Some(bucket) = env.get("ASSET_BUCKET") {
        config.assets.bucket = Some(bucket);
    }

    // Logging
    if let Some(level) = env.get("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<u32>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
