// keyrotator-config - Deploy-time configuration for the access key rotator stack
//
// Supports configuration from multiple sources:
// 1. CLI context pairs (-c iamUser=...) (highest priority)
// 2. Environment variables (KEYROTATOR_* prefix, CDK_DEFAULT_* fallbacks)
// 3. Config file path from --config or KEYROTATOR_CONFIG env var
// 4. Config file contents from KEYROTATOR_CONFIG_CONTENT env var
// 5. Default config file locations (./keyrotator.toml, ./.keyrotator.toml)
// 6. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod context;
mod env_overrides;
mod sources;
mod validation;

pub use context::ContextOverride;
pub use env_overrides::{EnvSource, StdEnvSource, ENV_PREFIX};

/// Complete description of one deployment of the rotator stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub stack_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub env: Environment,
    pub rotator: RotatorSettings,
    pub role: RoleConfig,
    pub function: FunctionConfig,
    pub debug: DebugConfig,
    pub schedule: ScheduleConfig,
    pub bucket: BucketConfig,
    pub assets: AssetsConfig,
    pub logging: LoggingConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "AccessKeyRotatorStack".to_string(),
            description: None,
            env: Environment::default(),
            rotator: RotatorSettings::default(),
            role: RoleConfig::default(),
            function: FunctionConfig::default(),
            debug: DebugConfig::default(),
            schedule: ScheduleConfig::default(),
            bucket: BucketConfig::default(),
            assets: AssetsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Target account and region.
///
/// Unset values are resolved by CloudFormation at deploy time through the
/// `AWS::AccountId` and `AWS::Region` pseudo parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub partition: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            account: None,
            region: None,
            partition: "aws".to_string(),
        }
    }
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
            partition: "aws".to_string(),
        }
    }

    /// True when both account and region are known at synth time
    pub fn is_concrete(&self) -> bool {
        self.account.is_some() && self.region.is_some()
    }
}

/// Settings handed to the rotator Lambda.
///
/// The Lambda environment and the role's policy resources are both derived
/// from this one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorSettings {
    pub cloud_provider: String,
    pub iam_user: String,
    pub secrets_store: String,
    pub secret_name: String,
    pub repo_owner: String,
    pub repo_name: String,
    /// SSM parameter holding the GitHub token
    pub token_config_store_path: String,
    pub github_app_id: String,
    pub github_inst_id: String,
}

impl Default for RotatorSettings {
    fn default() -> Self {
        Self {
            cloud_provider: "aws".to_string(),
            iam_user: "GithubIAMUser".to_string(),
            secrets_store: "github".to_string(),
            secret_name: "TESTING".to_string(),
            repo_owner: "dorneanu".to_string(),
            repo_name: "test".to_string(),
            token_config_store_path: "github-token".to_string(),
            github_app_id: "114149".to_string(),
            github_inst_id: "16758104".to_string(),
        }
    }
}

impl RotatorSettings {
    /// Environment variables the rotator Lambda reads at startup
    pub fn lambda_environment(&self) -> BTreeMap<String, String> {
        [
            ("CLOUD_PROVIDER", &self.cloud_provider),
            ("IAM_USER", &self.iam_user),
            ("SECRETS_STORE", &self.secrets_store),
            ("SECRET_NAME", &self.secret_name),
            ("REPO_OWNER", &self.repo_owner),
            ("REPO_NAME", &self.repo_name),
            ("TOKEN_CONFIG_STORE_PATH", &self.token_config_store_path),
            ("GITHUB_APP_ID", &self.github_app_id),
            ("GITHUB_INST_ID", &self.github_inst_id),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
    }
}

/// Execution role configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub description: String,
    /// Attach AWSLambdaBasicExecutionRole so the functions can write logs
    pub basic_execution: bool,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            description: "IAM Role to be assumed by the lambda".to_string(),
            basic_execution: true,
        }
    }
}

/// Production function configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    pub runtime: Runtime,
    pub handler: String,
    /// Pre-built zip uploaded as the production code asset
    pub artifact: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::ProvidedAl2023,
            handler: "access-key-rotator.lambda".to_string(),
            artifact: PathBuf::from("build/AccessKeyRotator.zip"),
            memory_size: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Runtime {
    #[serde(rename = "go1.x")]
    Go1x,
    #[serde(rename = "provided.al2")]
    ProvidedAl2,
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Go1x => "go1.x",
            Runtime::ProvidedAl2 => "provided.al2",
            Runtime::ProvidedAl2023 => "provided.al2023",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Runtime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "go1.x" | "go" => Ok(Runtime::Go1x),
            "provided.al2" => Ok(Runtime::ProvidedAl2),
            "provided.al2023" | "provided" => Ok(Runtime::ProvidedAl2023),
            _ => anyhow::bail!(
                "Unsupported runtime: {}. Supported: go1.x, provided.al2, provided.al2023",
                s
            ),
        }
    }
}

/// Debug function configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub source: CodeSource,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: CodeSource::Directory {
                path: PathBuf::from("build"),
            },
        }
    }
}

/// Where locally-packaged code comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CodeSource {
    /// Directory zipped at synth time
    Directory { path: PathBuf },
    /// Zip file used as-is
    Zip { path: PathBuf },
}

impl CodeSource {
    pub fn path(&self) -> &Path {
        match self {
            CodeSource::Directory { path } | CodeSource::Zip { path } => path,
        }
    }
}

/// Schedule rule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub expression: String,
    pub enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            // Every day at 10:30 UTC
            expression: "cron(30 10 * * ? *)".to_string(),
            enabled: true,
        }
    }
}

/// Auxiliary storage bucket configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub versioned: bool,
    pub removal_policy: RemovalPolicy,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: None,
            versioned: true,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
        }
    }
}

/// Staging bucket for code assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Explicit staging bucket. Defaults to the CDK bootstrap bucket
    /// `cdk-<qualifier>-assets-<account>-<region>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    pub qualifier: String,
    pub prefix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            qualifier: "hnb659fds".to_string(),
            prefix: "assets/".to_string(),
        }
    }
}

/// Logging configuration for the CLI itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl StackConfig {
    /// Load configuration from default locations and the process environment
    pub fn load() -> Result<Self> {
        Self::resolve(None, &StdEnvSource, &[])
    }

    /// Load configuration from an explicit file plus the process environment
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::resolve(Some(path.as_ref()), &StdEnvSource, &[])
    }

    /// Layer file, environment and context values over the defaults, then
    /// validate the result.
    pub fn resolve<E: EnvSource>(
        path: Option<&Path>,
        env: &E,
        context: &[ContextOverride],
    ) -> Result<Self> {
        let config = Self::load_layers(path, env, context)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer file, environment and context values over the defaults without
    /// validating. Callers must run [`StackConfig::validate`] before use.
    pub fn load_layers<E: EnvSource>(
        path: Option<&Path>,
        env: &E,
        context: &[ContextOverride],
    ) -> Result<Self> {
        let mut config = match path {
            Some(path) => sources::load_from_file_path(path)?,
            None => sources::load_from_default_sources(env)?.unwrap_or_default(),
        };

        env_overrides::apply_env_overrides(&mut config, env)?;
        context::apply_context(&mut config, context)?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults without validating it
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_from_str() {
        assert_eq!("go1.x".parse::<Runtime>().unwrap(), Runtime::Go1x);
        assert_eq!(
            "provided.al2".parse::<Runtime>().unwrap(),
            Runtime::ProvidedAl2
        );
        assert_eq!(
            "PROVIDED".parse::<Runtime>().unwrap(),
            Runtime::ProvidedAl2023
        );
        assert!("nodejs20.x".parse::<Runtime>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = StackConfig::default();
        assert_eq!(config.stack_name, "AccessKeyRotatorStack");
        assert_eq!(config.rotator.iam_user, "GithubIAMUser");
        assert_eq!(config.rotator.token_config_store_path, "github-token");
        assert_eq!(config.schedule.expression, "cron(30 10 * * ? *)");
        assert!(config.bucket.versioned);
        assert_eq!(config.bucket.removal_policy, RemovalPolicy::Destroy);
        assert!(config.debug.enabled);
        assert!(!config.env.is_concrete());
    }

    #[test]
    fn test_lambda_environment_keys() {
        let env = RotatorSettings::default().lambda_environment();
        assert_eq!(env.len(), 9);
        assert_eq!(env["IAM_USER"], "GithubIAMUser");
        assert_eq!(env["TOKEN_CONFIG_STORE_PATH"], "github-token");
        assert_eq!(env["GITHUB_INST_ID"], "16758104");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StackConfig::from_toml(
            r#"
            stack_name = "RotatorProd"

            [rotator]
            iam_user = "DeployBot"

            [debug.source]
            kind = "zip"
            path = "dist/debug.zip"
            "#,
        )
        .unwrap();

        assert_eq!(config.stack_name, "RotatorProd");
        assert_eq!(config.rotator.iam_user, "DeployBot");
        assert_eq!(config.rotator.secrets_store, "github");
        assert_eq!(
            config.debug.source,
            CodeSource::Zip {
                path: PathBuf::from("dist/debug.zip")
            }
        );
        assert!(config.debug.enabled);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = StackConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(StackConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_layers_then_validation() {
        use crate::env_overrides::tests::MapEnv;

        let env = MapEnv::new()
            .with("KEYROTATOR_CONFIG_CONTENT", "[rotator]\niam_user = \"FileUser\"\n")
            .with("KEYROTATOR_IAM_USER", "EnvUser")
            .with("CDK_DEFAULT_ACCOUNT", "451556475769");
        let context = [ContextOverride::new("iamUser", "ContextUser")];

        let config = StackConfig::resolve(None, &env, &context).unwrap();
        assert_eq!(config.rotator.iam_user, "ContextUser");
        assert_eq!(config.env.account.as_deref(), Some("451556475769"));

        // Invalid values survive layering and are caught by validation
        let bad = [ContextOverride::new("account", "1234")];
        let layered = StackConfig::load_layers(None, &env, &bad).unwrap();
        assert_eq!(layered.env.account.as_deref(), Some("1234"));
        assert!(StackConfig::resolve(None, &env, &bad).is_err());
    }
}
