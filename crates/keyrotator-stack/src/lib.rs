//! CloudFormation synthesis for the access key rotator
//!
//! Builds the stack that runs the rotator Lambda on a schedule: an execution
//! role scoped to one SSM parameter and one IAM user, the production and
//! debug functions, an auxiliary versioned bucket and the EventBridge rule.

// Rich asset errors carry the offending path.
#![allow(clippy::result_large_err)]

pub mod arn;
mod asset;
mod error;
mod intrinsic;
pub mod resources;
mod schedule;
mod stack;
mod template;

pub use asset::{Asset, AssetManifest, AssetPackaging, ManifestEntry, StackAssets};
pub use error::{ErrorCode, Result, StackError};
pub use intrinsic::{pseudo, sub_variables, Value};
pub use schedule::{CronFields, RateUnit, ScheduleExpression};
pub use stack::{
    build_stack, Stack, BUCKET_ID, DEBUG_FUNCTION_ID, FUNCTION_ID, IAM_KEY_ACTIONS,
    PERMISSION_ID, ROLE_ID, RULE_ID, SSM_ACTIONS,
};
pub use template::{Output, Template, TEMPLATE_FORMAT_VERSION};

// Re-export for callers that resolve configuration themselves
pub use keyrotator_config;
