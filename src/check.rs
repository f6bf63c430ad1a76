//! `check`: build the stack in memory and summarize it

use anyhow::{Context, Result};
use keyrotator_config::StackConfig;
use keyrotator_stack::{build_stack, Stack, StackAssets};
use std::fmt::Write;

pub fn run(config: &StackConfig) -> Result<()> {
    let assets = StackAssets::resolve(config).context("Failed to fingerprint code assets")?;
    let stack = build_stack(config, &assets).context("Failed to build stack")?;
    print!("{}", summary(config, &stack));
    Ok(())
}

/// Human readable description of what the stack would deploy
pub fn summary(config: &StackConfig, stack: &Stack) -> String {
    let mut out = String::new();
    let env = &config.env;
    let _ = writeln!(out, "Stack: {}", stack.name);
    let _ = writeln!(
        out,
        "Environment: account={} region={} partition={}",
        env.account.as_deref().unwrap_or("<deploy-time>"),
        env.region.as_deref().unwrap_or("<deploy-time>"),
        env.partition
    );

    let _ = writeln!(out, "Resources:");
    for (id, resource) in stack.template.resources() {
        let _ = writeln!(out, "  {} ({})", id, resource.type_name());
    }

    let _ = writeln!(out, "Role permissions:");
    for statement in stack.role_statements() {
        let resources: Vec<String> = statement.resource.iter().map(ToString::to_string).collect();
        let _ = writeln!(
            out,
            "  {} on {}",
            statement.action.join(", "),
            resources.join(", ")
        );
    }

    if let Some(rule) = stack.rule() {
        let _ = writeln!(
            out,
            "Schedule: {} ({:?})",
            rule.schedule_expression, rule.state
        );
    }

    let _ = writeln!(out, "Assets:");
    for entry in &stack.manifest.files {
        let _ = writeln!(
            out,
            "  {} <- {} [{}]",
            entry.object_key,
            entry.source_path.display(),
            entry.id
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrotator_config::Environment;
    use keyrotator_stack::{Asset, AssetPackaging};

    #[test]
    fn test_summary_lists_scoped_permissions() {
        let mut config = StackConfig::default();
        config.env = Environment::new("451556475769", "eu-central-1");
        config.debug.enabled = false;
        let assets = StackAssets {
            production: Asset::new(
                StackAssets::PRODUCTION_ID,
                "build/AccessKeyRotator.zip",
                AssetPackaging::File,
                "abc",
            ),
            debug: None,
        };

        let stack = build_stack(&config, &assets).unwrap();
        let summary = summary(&config, &stack);

        assert!(summary.contains("Stack: AccessKeyRotatorStack"));
        assert!(summary.contains("AccessKeyRotatorLambda (AWS::Lambda::Function)"));
        assert!(!summary.contains("DebugAccessKeyRotatorLambda"));
        assert!(summary.contains(
            "ssm:GetParameter on arn:aws:ssm:eu-central-1:451556475769:parameter/github-token"
        ));
        assert!(summary.contains("arn:aws:iam::451556475769:user/GithubIAMUser"));
        assert!(summary.contains("Schedule: cron(30 10 * * ? *) (Enabled)"));
        assert!(summary.contains("assets/abc.zip <- build/AccessKeyRotator.zip"));
    }
}
