// Configuration validation
//
// Rejects values that would produce a broken stack or widen an IAM resource
// pattern beyond the intended parameter and user.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

const IAM_USER_MAX_LEN: usize = 64;
const PARAMETER_NAME_MAX_LEN: usize = 2048;
const STACK_NAME_MAX_LEN: usize = 128;
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

pub fn validate_config(config: &StackConfig) -> Result<()> {
    validate_stack_name(&config.stack_name)?;
    validate_environment(&config.env)?;
    validate_rotator_settings(&config.rotator)?;
    validate_function_config(&config.function)?;

    if config.debug.enabled && config.debug.source.path().as_os_str().is_empty() {
        bail!("debug.source.path must not be empty when the debug function is enabled");
    }

    if config.schedule.expression.trim().is_empty() {
        bail!("schedule.expression must not be empty");
    }

    if config.assets.prefix.starts_with('/') {
        bail!("assets.prefix must not start with '/'");
    }
    if config.assets.bucket.is_none() && config.assets.qualifier.is_empty() {
        bail!("assets.qualifier is required when assets.bucket is not set");
    }

    validate_log_level(&config.logging.level)?;

    Ok(())
}

/// Accepts `EnvFilter` directives separated by commas: a bare level, a bare
/// target (`keyrotator_stack`) or `target=level`.
fn validate_log_level(filter: &str) -> Result<()> {
    if filter.trim().is_empty() {
        bail!("logging.level must not be empty");
    }
    for directive in filter.split(',').map(str::trim) {
        let (target, level) = match directive.rsplit_once('=') {
            Some((target, level)) => (target.trim(), Some(level.trim())),
            None if is_log_level(directive) => continue,
            None => (directive, None),
        };
        if !is_log_target(target) {
            bail!("logging.level directive '{}' has an invalid target", directive);
        }
        if let Some(level) = level.filter(|level| !is_log_level(level)) {
            bail!(
                "logging.level '{}' is not one of {}",
                level,
                LOG_LEVELS.join(", ")
            );
        }
    }
    Ok(())
}

fn is_log_level(value: &str) -> bool {
    LOG_LEVELS.contains(&value.to_ascii_lowercase().as_str())
}

fn is_log_target(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
}

fn validate_stack_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("stack_name must not be empty");
    }
    if name.len() > STACK_NAME_MAX_LEN {
        bail!("stack_name must be at most {} characters", STACK_NAME_MAX_LEN);
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        bail!("stack_name must start with a letter");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        bail!("stack_name may only contain letters, digits and hyphens");
    }
    Ok(())
}

fn validate_environment(env: &Environment) -> Result<()> {
    if let Some(account) = &env.account {
        if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
            bail!("env.account must be a 12-digit AWS account id, got '{}'", account);
        }
    }

    if let Some(region) = &env.region {
        if !is_region_like(region) {
            bail!("env.region '{}' does not look like an AWS region", region);
        }
    }

    if !env.partition.starts_with("aws") {
        bail!("env.partition must be an AWS partition (aws, aws-cn, aws-us-gov)");
    }

    if !env.is_concrete() {
        warn!("env.account or env.region unset; ARNs will resolve from pseudo parameters at deploy time");
    }

    Ok(())
}

/// `eu-central-1`, `us-gov-west-1`, ...
fn is_region_like(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    if parts.len() < 3 {
        return false;
    }
    let (last, rest) = match parts.split_last() {
        Some(split) => split,
        None => return false,
    };
    !last.is_empty()
        && last.chars().all(|c| c.is_ascii_digit())
        && rest
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
}

fn validate_rotator_settings(settings: &RotatorSettings) -> Result<()> {
    if settings.cloud_provider != "aws" {
        bail!(
            "rotator.cloud_provider must be 'aws' for this stack, got '{}'",
            settings.cloud_provider
        );
    }

    validate_iam_user(&settings.iam_user)?;
    validate_parameter_name(&settings.token_config_store_path)?;

    let required = [
        ("rotator.secrets_store", &settings.secrets_store),
        ("rotator.secret_name", &settings.secret_name),
        ("rotator.repo_owner", &settings.repo_owner),
        ("rotator.repo_name", &settings.repo_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            bail!("{} is required", field);
        }
    }

    for (field, value) in [
        ("rotator.github_app_id", &settings.github_app_id),
        ("rotator.github_inst_id", &settings.github_inst_id),
    ] {
        if value.is_empty() {
            warn!(field, "GitHub App setting is empty; the rotator will fail to authenticate");
        } else if !value.chars().all(|c| c.is_ascii_digit()) {
            bail!("{} must be numeric, got '{}'", field, value);
        }
    }

    Ok(())
}

/// IAM user names: alphanumerics plus `+=,.@_-`. Wildcards would widen the
/// `iam:*AccessKey*` grant to other users.
fn validate_iam_user(user: &str) -> Result<()> {
    if user.is_empty() {
        bail!("rotator.iam_user must not be empty");
    }
    if user.len() > IAM_USER_MAX_LEN {
        bail!("rotator.iam_user must be at most {} characters", IAM_USER_MAX_LEN);
    }
    if let Some(c) = user
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "+=,.@_-".contains(*c)))
    {
        bail!("rotator.iam_user contains invalid character '{}'", c);
    }
    Ok(())
}

/// SSM parameter names: alphanumerics plus `_.-/`, optionally rooted at `/`.
fn validate_parameter_name(name: &str) -> Result<()> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        bail!("rotator.token_config_store_path must name a parameter");
    }
    if name.len() > PARAMETER_NAME_MAX_LEN {
        bail!(
            "rotator.token_config_store_path must be at most {} characters",
            PARAMETER_NAME_MAX_LEN
        );
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_.-/".contains(*c)))
    {
        bail!(
            "rotator.token_config_store_path contains invalid character '{}'",
            c
        );
    }
    if name.ends_with('/') || trimmed.contains("//") {
        bail!("rotator.token_config_store_path has an empty path segment");
    }
    Ok(())
}

fn validate_function_config(function: &FunctionConfig) -> Result<()> {
    if function.handler.trim().is_empty() {
        bail!("function.handler must not be empty");
    }
    if function.artifact.as_os_str().is_empty() {
        bail!("function.artifact must not be empty");
    }
    if let Some(memory) = function.memory_size {
        if !(128..=10_240).contains(&memory) {
            bail!("function.memory_size must be between 128 and 10240 MB");
        }
    }
    if let Some(timeout) = function.timeout_secs {
        if !(1..=900).contains(&timeout) {
            bail!("function.timeout_secs must be between 1 and 900");
        }
    }
    if function.runtime == Runtime::Go1x {
        warn!("go1.x runtime is deprecated by AWS; prefer provided.al2023");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&StackConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_iam_user() {
        assert!(validate_iam_user("GithubIAMUser").is_ok());
        assert!(validate_iam_user("deploy+ci@example.com").is_ok());
        assert!(validate_iam_user("").is_err());
        assert!(validate_iam_user("Github*").is_err());
        assert!(validate_iam_user("user?").is_err());
        assert!(validate_iam_user("path/user").is_err());
        assert!(validate_iam_user(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_parameter_name() {
        assert!(validate_parameter_name("github-token").is_ok());
        assert!(validate_parameter_name("/ci/github/token").is_ok());
        assert!(validate_parameter_name("").is_err());
        assert!(validate_parameter_name("/").is_err());
        assert!(validate_parameter_name("github-*").is_err());
        assert!(validate_parameter_name("ci/").is_err());
        assert!(validate_parameter_name("ci//token").is_err());
    }

    #[test]
    fn test_validate_environment() {
        assert!(validate_environment(&Environment::new("451556475769", "eu-central-1")).is_ok());
        assert!(validate_environment(&Environment::new("451556475769", "us-gov-west-1")).is_ok());
        assert!(validate_environment(&Environment::new("4515", "eu-central-1")).is_err());
        assert!(validate_environment(&Environment::new("451556475769", "Frankfurt")).is_err());
        assert!(validate_environment(&Environment::new("451556475769", "eu-central")).is_err());
        assert!(validate_environment(&Environment::default()).is_ok());
    }

    #[test]
    fn test_validate_stack_name() {
        assert!(validate_stack_name("AccessKeyRotatorStack").is_ok());
        assert!(validate_stack_name("rotator-prod-1").is_ok());
        assert!(validate_stack_name("1rotator").is_err());
        assert!(validate_stack_name("rotator_prod").is_err());
        assert!(validate_stack_name("").is_err());
    }

    #[test]
    fn test_rejects_non_aws_provider() {
        let mut config = StackConfig::default();
        config.rotator.cloud_provider = "azure".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_non_numeric_app_id() {
        let mut config = StackConfig::default();
        config.rotator.github_app_id = "abc".to_string();
        assert!(validate_config(&config).is_err());

        config.rotator.github_app_id = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_function_limits() {
        let mut config = StackConfig::default();
        config.function.memory_size = Some(64);
        assert!(validate_config(&config).is_err());

        config.function.memory_size = Some(256);
        config.function.timeout_secs = Some(901);
        assert!(validate_config(&config).is_err());

        config.function.timeout_secs = Some(60);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        assert!(validate_log_level("info").is_ok());
        assert!(validate_log_level("DEBUG").is_ok());
        assert!(validate_log_level("warn,keyrotator_stack=trace").is_ok());
        assert!(validate_log_level("keyrotator_stack").is_ok());
        assert!(validate_log_level("info,keyrotator_config::validation").is_ok());
        assert!(validate_log_level("keyrotator_stack=loud").is_err());
        assert!(validate_log_level("=debug").is_err());
        assert!(validate_log_level("keyrotator stack").is_err());
        assert!(validate_log_level("").is_err());
    }
}
