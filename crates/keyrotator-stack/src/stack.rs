//! The access key rotator stack
//!
//! [`build_stack`] turns a validated [`StackConfig`] plus fingerprinted assets
//! into a template. It performs no I/O: everything it needs arrives through
//! its arguments.

use crate::arn;
use crate::asset::{Asset, AssetManifest, StackAssets};
use crate::error::{Result, StackError};
use crate::intrinsic::Value;
use crate::resources::{
    BucketProperties, DeletionPolicy, FunctionCode, FunctionEnvironment, FunctionProperties,
    InlinePolicy, PermissionProperties, PolicyDocument, PolicyStatement, Resource,
    ResourceProperties, RoleProperties, RuleProperties, RuleState, RuleTarget,
    VersioningConfiguration,
};
use crate::schedule::ScheduleExpression;
use crate::template::{Output, Template};
use keyrotator_config::{RemovalPolicy, StackConfig};
use tracing::{debug, info};

pub const ROLE_ID: &str = "AccessKeyRotatorIAMRole";
pub const FUNCTION_ID: &str = "AccessKeyRotatorLambda";
pub const DEBUG_FUNCTION_ID: &str = "DebugAccessKeyRotatorLambda";
pub const BUCKET_ID: &str = "AccessKeyRotatorBucket";
pub const RULE_ID: &str = "AccessKeyRotatorRule";
pub const PERMISSION_ID: &str = "AccessKeyRotatorRuleInvokePermission";

const ROLE_POLICY_NAME: &str = "AccessKeyRotatorPolicy";
const LAMBDA_SERVICE: &str = "lambda.amazonaws.com";
const EVENTS_SERVICE: &str = "events.amazonaws.com";
const BASIC_EXECUTION_POLICY: &str = "service-role/AWSLambdaBasicExecutionRole";

pub const SSM_ACTIONS: &[&str] = &["ssm:GetParameter"];
pub const IAM_KEY_ACTIONS: &[&str] = &[
    "iam:ListAccessKeys",
    "iam:CreateAccessKey",
    "iam:DeleteAccessKey",
];

/// A synthesized stack: template plus the assets it expects in S3
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub template: Template,
    pub manifest: AssetManifest,
}

impl Stack {
    /// Statements of the execution role's inline policy, in order
    pub fn role_statements(&self) -> &[PolicyStatement] {
        match self.template.resource(ROLE_ID).map(|r| &r.properties) {
            Some(ResourceProperties::Role(role)) => role
                .policies
                .first()
                .map(|policy| policy.policy_document.statement.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    pub fn function(&self, logical_id: &str) -> Option<&FunctionProperties> {
        match self.template.resource(logical_id).map(|r| &r.properties) {
            Some(ResourceProperties::Function(function)) => Some(function),
            _ => None,
        }
    }

    pub fn rule(&self) -> Option<&RuleProperties> {
        match self.template.resource(RULE_ID).map(|r| &r.properties) {
            Some(ResourceProperties::Rule(rule)) => Some(rule),
            _ => None,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        self.template.to_json_pretty()
    }
}

/// Build the rotator stack from configuration and resolved assets.
pub fn build_stack(config: &StackConfig, assets: &StackAssets) -> Result<Stack> {
    let env = &config.env;
    let settings = &config.rotator;

    check_scope("rotator.iam_user", &settings.iam_user)?;
    check_scope(
        "rotator.token_config_store_path",
        settings.token_config_store_path.trim_start_matches('/'),
    )?;

    let schedule = ScheduleExpression::parse(&config.schedule.expression)?;

    let description = config.description.clone().or_else(|| {
        Some(format!(
            "Access key rotation for IAM user {} (scheduled {})",
            settings.iam_user, schedule
        ))
    });
    let mut template = Template::new(description);

    // 1. Staging location of the code assets
    let asset_bucket = match &config.assets.bucket {
        Some(bucket) => Value::literal(bucket.clone()),
        None => arn::bootstrap_assets_bucket(env, &config.assets.qualifier),
    };
    let manifest = AssetManifest::new(assets, &asset_bucket, &config.assets.prefix);

    // 2. Execution role scoped to exactly one parameter and one IAM user
    let parameter_arn = arn::ssm_parameter_arn(env, &settings.token_config_store_path);
    let user_arn = arn::iam_user_arn(env, &settings.iam_user);
    debug!(parameter = %parameter_arn, user = %user_arn, "Scoped role resources");

    let statements = vec![
        PolicyStatement::allow(SSM_ACTIONS.iter().copied(), [parameter_arn]),
        PolicyStatement::allow(IAM_KEY_ACTIONS.iter().copied(), [user_arn]),
    ];
    let managed_policy_arns = if config.role.basic_execution {
        vec![arn::managed_policy_arn(env, BASIC_EXECUTION_POLICY)]
    } else {
        Vec::new()
    };
    template.add_resource(
        ROLE_ID,
        Resource::new(ResourceProperties::Role(RoleProperties {
            assume_role_policy_document: PolicyDocument::new(vec![
                PolicyStatement::assume_role_by(LAMBDA_SERVICE),
            ]),
            description: Some(config.role.description.clone()),
            managed_policy_arns,
            policies: vec![InlinePolicy {
                policy_name: ROLE_POLICY_NAME.to_string(),
                policy_document: PolicyDocument::new(statements),
            }],
        })),
    )?;

    // 3. Production and debug functions share everything but their code
    let environment = FunctionEnvironment {
        variables: settings.lambda_environment(),
    };
    let function = |description: &str, asset: &Asset| FunctionProperties {
        description: Some(description.to_string()),
        runtime: config.function.runtime.as_str().to_string(),
        handler: config.function.handler.clone(),
        code: FunctionCode {
            s3_bucket: asset_bucket.clone(),
            s3_key: asset.object_key(&config.assets.prefix),
        },
        role: Value::get_att(ROLE_ID, "Arn"),
        environment: Some(environment.clone()),
        memory_size: config.function.memory_size,
        timeout: config.function.timeout_secs,
    };

    template.add_resource(
        FUNCTION_ID,
        Resource::new(ResourceProperties::Function(function(
            "Rotates IAM access keys on a schedule",
            &assets.production,
        ))),
    )?;

    if config.debug.enabled {
        let debug_asset = assets.debug.as_ref().ok_or_else(|| {
            StackError::invalid_input("debug.source", "debug function enabled without a debug asset")
        })?;
        template.add_resource(
            DEBUG_FUNCTION_ID,
            Resource::new(ResourceProperties::Function(function(
                "Locally packaged build of the access key rotator for debugging",
                debug_asset,
            ))),
        )?;
    }

    // 4. Auxiliary bucket
    let removal = match config.bucket.removal_policy {
        RemovalPolicy::Destroy => DeletionPolicy::Delete,
        RemovalPolicy::Retain => DeletionPolicy::Retain,
    };
    template.add_resource(
        BUCKET_ID,
        Resource::new(ResourceProperties::Bucket(BucketProperties {
            bucket_name: config.bucket.name.clone(),
            versioning_configuration: config
                .bucket
                .versioned
                .then(VersioningConfiguration::enabled),
        }))
        .with_removal_policy(removal),
    )?;

    // 5. Schedule targeting the production function only
    template.add_resource(
        RULE_ID,
        Resource::new(ResourceProperties::Rule(RuleProperties {
            description: Some("Runs the access key rotator".to_string()),
            schedule_expression: schedule.to_string(),
            state: if config.schedule.enabled {
                RuleState::Enabled
            } else {
                RuleState::Disabled
            },
            targets: vec![RuleTarget {
                arn: Value::get_att(FUNCTION_ID, "Arn"),
                id: "Target0".to_string(),
            }],
        })),
    )?;
    template.add_resource(
        PERMISSION_ID,
        Resource::new(ResourceProperties::Permission(PermissionProperties {
            action: "lambda:InvokeFunction".to_string(),
            function_name: Value::get_att(FUNCTION_ID, "Arn"),
            principal: EVENTS_SERVICE.to_string(),
            source_arn: Some(Value::get_att(RULE_ID, "Arn")),
        })),
    )?;

    add_outputs(&mut template, config)?;
    template.validate_references()?;

    info!(
        stack = %config.stack_name,
        resources = template.resources().count(),
        schedule = %schedule,
        "Built stack"
    );

    Ok(Stack {
        name: config.stack_name.clone(),
        template,
        manifest,
    })
}

fn add_outputs(template: &mut Template, config: &StackConfig) -> Result<()> {
    template.add_output(
        "FunctionName",
        Output {
            description: Some("Scheduled rotator function".to_string()),
            value: Value::reference(FUNCTION_ID),
        },
    )?;
    if config.debug.enabled {
        template.add_output(
            "DebugFunctionName",
            Output {
                description: Some("Debug rotator function".to_string()),
                value: Value::reference(DEBUG_FUNCTION_ID),
            },
        )?;
    }
    template.add_output(
        "RoleArn",
        Output {
            description: None,
            value: Value::get_att(ROLE_ID, "Arn"),
        },
    )?;
    template.add_output(
        "BucketName",
        Output {
            description: None,
            value: Value::reference(BUCKET_ID),
        },
    )
}

/// An empty or wildcard component would widen the policy resource.
fn check_scope(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StackError::invalid_input(field, "must not be empty"));
    }
    if let Some(c) = value.chars().find(|c| matches!(c, '*' | '?' | '$' | '{' | '}')) {
        return Err(StackError::invalid_input(
            field,
            format!("'{}' is not allowed in a policy resource", c),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetPackaging;
    use keyrotator_config::{ContextOverride, Environment};
    use serde_json::json;

    fn assets() -> StackAssets {
        StackAssets {
            production: Asset::new("Prod", "build/AccessKeyRotator.zip", AssetPackaging::File, "prod"),
            debug: Some(Asset::new(
                "Debug",
                "build",
                AssetPackaging::ZipDirectory,
                "dbg",
            )),
        }
    }

    fn frankfurt_config() -> StackConfig {
        let mut config = StackConfig::default();
        config.env = Environment::new("451556475769", "eu-central-1");
        config
    }

    #[test]
    fn test_reference_arns() {
        let stack = build_stack(&frankfurt_config(), &assets()).unwrap();
        let statements = stack.role_statements();
        assert_eq!(statements.len(), 2);

        assert_eq!(statements[0].action, vec!["ssm:GetParameter"]);
        assert_eq!(
            statements[0].resource,
            vec![Value::literal(
                "arn:aws:ssm:eu-central-1:451556475769:parameter/github-token"
            )]
        );

        assert_eq!(
            statements[1].action,
            vec![
                "iam:ListAccessKeys",
                "iam:CreateAccessKey",
                "iam:DeleteAccessKey"
            ]
        );
        assert_eq!(
            statements[1].resource,
            vec![Value::literal("arn:aws:iam::451556475769:user/GithubIAMUser")]
        );
    }

    #[test]
    fn test_scope_follows_configuration() {
        let mut config = frankfurt_config();
        config.rotator.iam_user = "ReleaseBot".to_string();
        config.rotator.token_config_store_path = "/release/github-token".to_string();

        let stack = build_stack(&config, &assets()).unwrap();
        let statements = stack.role_statements();
        assert_eq!(
            statements[0].resource,
            vec![Value::literal(
                "arn:aws:ssm:eu-central-1:451556475769:parameter/release/github-token"
            )]
        );
        assert_eq!(
            statements[1].resource,
            vec![Value::literal("arn:aws:iam::451556475769:user/ReleaseBot")]
        );

        // The same values reach the Lambda environment
        let variables = &stack
            .function(FUNCTION_ID)
            .unwrap()
            .environment
            .as_ref()
            .unwrap()
            .variables;
        assert_eq!(variables["IAM_USER"], "ReleaseBot");
        assert_eq!(variables["TOKEN_CONFIG_STORE_PATH"], "/release/github-token");
    }

    #[test]
    fn test_functions_differ_only_in_code() {
        let stack = build_stack(&frankfurt_config(), &assets()).unwrap();
        let production = stack.function(FUNCTION_ID).unwrap();
        let debug = stack.function(DEBUG_FUNCTION_ID).unwrap();

        assert_eq!(production.environment, debug.environment);
        assert_eq!(production.role, debug.role);
        assert_eq!(production.runtime, debug.runtime);
        assert_eq!(production.handler, debug.handler);
        assert_eq!(production.code.s3_bucket, debug.code.s3_bucket);
        assert_eq!(production.code.s3_key, "assets/prod.zip");
        assert_eq!(debug.code.s3_key, "assets/dbg.zip");
    }

    #[test]
    fn test_rule_targets_production_only() {
        let stack = build_stack(&frankfurt_config(), &assets()).unwrap();
        let rule = stack.rule().unwrap();

        assert_eq!(rule.schedule_expression, "cron(30 10 * * ? *)");
        assert_eq!(rule.targets.len(), 1);
        assert_eq!(rule.targets[0].arn, Value::get_att(FUNCTION_ID, "Arn"));

        let json = stack.template.to_json().unwrap();
        assert_eq!(
            json["Resources"][PERMISSION_ID]["Properties"],
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": {"Fn::GetAtt": [FUNCTION_ID, "Arn"]},
                "Principal": "events.amazonaws.com",
                "SourceArn": {"Fn::GetAtt": [RULE_ID, "Arn"]}
            })
        );
    }

    #[test]
    fn test_bucket_is_versioned_and_destroyed() {
        let stack = build_stack(&frankfurt_config(), &assets()).unwrap();
        let json = stack.template.to_json().unwrap();
        let bucket = &json["Resources"][BUCKET_ID];

        assert_eq!(bucket["Type"], "AWS::S3::Bucket");
        assert_eq!(
            bucket["Properties"]["VersioningConfiguration"]["Status"],
            "Enabled"
        );
        assert_eq!(bucket["DeletionPolicy"], "Delete");
        assert_eq!(bucket["UpdateReplacePolicy"], "Delete");
    }

    #[test]
    fn test_role_trust_and_managed_policy() {
        let stack = build_stack(&frankfurt_config(), &assets()).unwrap();
        let json = stack.template.to_json().unwrap();
        let role = &json["Resources"][ROLE_ID]["Properties"];

        assert_eq!(
            role["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"],
            "lambda.amazonaws.com"
        );
        assert_eq!(role["Description"], "IAM Role to be assumed by the lambda");
        assert_eq!(
            role["ManagedPolicyArns"][0],
            "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
        );
    }

    #[test]
    fn test_debug_function_can_be_disabled() {
        let mut config = frankfurt_config();
        config.debug.enabled = false;
        let assets = StackAssets {
            debug: None,
            ..assets()
        };

        let stack = build_stack(&config, &assets).unwrap();
        assert!(stack.function(DEBUG_FUNCTION_ID).is_none());
        assert!(stack.template.outputs().all(|(id, _)| id != "DebugFunctionName"));
        assert_eq!(stack.manifest.files.len(), 1);
    }

    #[test]
    fn test_debug_enabled_without_asset_fails() {
        let assets = StackAssets {
            debug: None,
            ..assets()
        };
        let err = build_stack(&frankfurt_config(), &assets).unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn test_environment_agnostic_stack_uses_pseudo_parameters() {
        let stack = build_stack(&StackConfig::default(), &assets()).unwrap();
        let statements = stack.role_statements();
        assert_eq!(
            statements[0].resource,
            vec![Value::sub(
                "arn:aws:ssm:${AWS::Region}:${AWS::AccountId}:parameter/github-token"
            )]
        );
        assert_eq!(
            stack.function(FUNCTION_ID).unwrap().code.s3_bucket,
            Value::sub("cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}")
        );
    }

    #[test]
    fn test_explicit_asset_bucket() {
        let mut config = frankfurt_config();
        config.assets.bucket = Some("rotator-artifacts".to_string());
        config.assets.prefix = "lambda/".to_string();

        let stack = build_stack(&config, &assets()).unwrap();
        let code = &stack.function(FUNCTION_ID).unwrap().code;
        assert_eq!(code.s3_bucket, Value::literal("rotator-artifacts"));
        assert_eq!(code.s3_key, "lambda/prod.zip");
        assert_eq!(stack.manifest.files[0].object_key, "lambda/prod.zip");
    }

    #[test]
    fn test_empty_or_wildcard_scope_fails() {
        for (iam_user, parameter) in [
            ("", "github-token"),
            ("GithubIAMUser", ""),
            ("GithubIAMUser", "/"),
            ("*", "github-token"),
            ("GithubIAMUser", "github-*"),
        ] {
            let mut config = frankfurt_config();
            config.rotator.iam_user = iam_user.to_string();
            config.rotator.token_config_store_path = parameter.to_string();
            let err = build_stack(&config, &assets()).unwrap_err();
            assert_eq!(err.code(), "E001", "{:?}/{:?}", iam_user, parameter);
        }
    }

    #[test]
    fn test_invalid_schedule_fails() {
        let mut config = frankfurt_config();
        config.schedule.expression = "cron(30 10 * * * *)".to_string();
        let err = build_stack(&config, &assets()).unwrap_err();
        assert_eq!(err.code(), "E002");
    }

    #[test]
    fn test_context_values_flow_through() {
        let config = StackConfig::resolve(
            None,
            &NoEnv,
            &[
                "iamUser=GithubIAMUser".parse::<ContextOverride>().unwrap(),
                "ssmParam=github-token".parse().unwrap(),
                "account=451556475769".parse().unwrap(),
                "region=eu-central-1".parse().unwrap(),
            ],
        )
        .unwrap();

        let stack = build_stack(&config, &assets()).unwrap();
        let json = stack.template.to_json().unwrap();
        let statements = &json["Resources"][ROLE_ID]["Properties"]["Policies"][0]["PolicyDocument"]
            ["Statement"];
        assert_eq!(
            statements[0]["Resource"][0],
            "arn:aws:ssm:eu-central-1:451556475769:parameter/github-token"
        );
        assert_eq!(
            statements[1]["Resource"][0],
            "arn:aws:iam::451556475769:user/GithubIAMUser"
        );
    }

    /// No environment variables at all, and no config file content
    struct NoEnv;

    impl keyrotator_config::EnvSource for NoEnv {
        fn get(&self, key: &str) -> Option<String> {
            // Point at inline content so no config file in the working
            // directory is picked up.
            (key == "CONFIG_CONTENT").then(String::new)
        }

        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
    }
}
