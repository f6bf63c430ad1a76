//! ARN construction scoped to the deployment environment
//!
//! Account and region come from [`Environment`]. When either is unknown at
//! synth time the ARN is emitted as an `Fn::Sub` over the matching pseudo
//! parameter, so a missing value never collapses into an empty ARN segment.

use crate::intrinsic::{pseudo, Value};
use keyrotator_config::Environment;

/// Which account/region segments an ARN carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// Left empty (global services such as IAM have no region)
    Empty,
    /// Taken from the deployment environment
    Deployment,
    /// Fixed text, e.g. the `aws` account of managed policies
    Fixed(&'a str),
}

fn render(
    env: &Environment,
    service: &str,
    region: Segment<'_>,
    account: Segment<'_>,
    resource: &str,
) -> Value {
    let mut deferred = false;

    let region = match region {
        Segment::Empty => String::new(),
        Segment::Fixed(value) => value.to_string(),
        Segment::Deployment => match &env.region {
            Some(region) => region.clone(),
            None => {
                deferred = true;
                format!("${{{}}}", pseudo::REGION)
            }
        },
    };

    let account = match account {
        Segment::Empty => String::new(),
        Segment::Fixed(value) => value.to_string(),
        Segment::Deployment => match &env.account {
            Some(account) => account.clone(),
            None => {
                deferred = true;
                format!("${{{}}}", pseudo::ACCOUNT_ID)
            }
        },
    };

    let arn = format!(
        "arn:{}:{}:{}:{}:{}",
        env.partition, service, region, account, resource
    );
    if deferred {
        Value::Sub(arn)
    } else {
        Value::Literal(arn)
    }
}

/// `arn:aws:ssm:<region>:<account>:parameter/<name>`
///
/// Hierarchical names (`/ci/token`) keep a single slash after `parameter`.
pub fn ssm_parameter_arn(env: &Environment, name: &str) -> Value {
    let name = name.trim_start_matches('/');
    render(
        env,
        "ssm",
        Segment::Deployment,
        Segment::Deployment,
        &format!("parameter/{}", name),
    )
}

/// `arn:aws:iam::<account>:user/<name>`
pub fn iam_user_arn(env: &Environment, user: &str) -> Value {
    render(
        env,
        "iam",
        Segment::Empty,
        Segment::Deployment,
        &format!("user/{}", user),
    )
}

/// `arn:aws:iam::aws:policy/<name>` for AWS managed policies
pub fn managed_policy_arn(env: &Environment, name: &str) -> Value {
    render(
        env,
        "iam",
        Segment::Empty,
        Segment::Fixed("aws"),
        &format!("policy/{}", name),
    )
}

/// Name of the CDK bootstrap staging bucket for this environment
pub fn bootstrap_assets_bucket(env: &Environment, qualifier: &str) -> Value {
    match (&env.account, &env.region) {
        (Some(account), Some(region)) => {
            Value::literal(format!("cdk-{}-assets-{}-{}", qualifier, account, region))
        }
        (account, region) => {
            let account = account
                .clone()
                .unwrap_or_else(|| format!("${{{}}}", pseudo::ACCOUNT_ID));
            let region = region
                .clone()
                .unwrap_or_else(|| format!("${{{}}}", pseudo::REGION));
            Value::sub(format!("cdk-{}-assets-{}-{}", qualifier, account, region))
        }
    }
}
