//! `init`: interactive wizard writing keyrotator.toml

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use dialoguer::{Confirm, Input};
use keyrotator_config::StackConfig;
use keyrotator_stack::ScheduleExpression;
use std::fs;
use std::path::PathBuf;

use crate::names;

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// CloudFormation stack name
    #[arg(long)]
    pub stack_name: Option<String>,

    /// AWS account id (leave unset to resolve at deploy time)
    #[arg(long)]
    pub account: Option<String>,

    /// AWS region (leave unset to resolve at deploy time)
    #[arg(long)]
    pub region: Option<String>,

    /// IAM user whose access keys are rotated
    #[arg(long)]
    pub iam_user: Option<String>,

    /// SSM parameter holding the GitHub token configuration
    #[arg(long)]
    pub ssm_param: Option<String>,

    /// GitHub repository owner receiving the rotated secret
    #[arg(long)]
    pub repo_owner: Option<String>,

    /// GitHub repository name receiving the rotated secret
    #[arg(long)]
    pub repo_name: Option<String>,

    /// EventBridge schedule, e.g. "cron(30 10 * * ? *)" or "rate(1 day)"
    #[arg(long)]
    pub schedule: Option<String>,

    /// Do not deploy the debug function
    #[arg(long)]
    pub no_debug: bool,

    /// Accept defaults instead of prompting for values not given as flags
    #[arg(long)]
    pub defaults: bool,

    /// Where to write the configuration
    #[arg(long, value_name = "FILE", default_value = "keyrotator.toml")]
    pub output: PathBuf,

    /// Overwrite existing file without asking
    #[arg(long)]
    pub force: bool,
}

type Setter = fn(&mut StackConfig, String);

pub fn run(args: InitArgs) -> Result<()> {
    println!();
    println!("keyrotator init - scheduled IAM access key rotation");
    println!();

    let interactive = !args.defaults;
    let mut config = StackConfig::default();

    let fields: [(&str, Option<String>, String, Setter); 8] = [
        ("Stack name", args.stack_name, names::generate(), |c, v| {
            c.stack_name = v
        }),
        ("AWS account (empty: deploy time)", args.account, String::new(), |c, v| {
            c.env.account = (!v.is_empty()).then_some(v)
        }),
        ("AWS region (empty: deploy time)", args.region, String::new(), |c, v| {
            c.env.region = (!v.is_empty()).then_some(v)
        }),
        ("IAM user to rotate", args.iam_user, config.rotator.iam_user.clone(), |c, v| {
            c.rotator.iam_user = v
        }),
        (
            "SSM parameter with the GitHub token config",
            args.ssm_param,
            config.rotator.token_config_store_path.clone(),
            |c, v| c.rotator.token_config_store_path = v,
        ),
        ("Repository owner", args.repo_owner, config.rotator.repo_owner.clone(), |c, v| {
            c.rotator.repo_owner = v
        }),
        ("Repository name", args.repo_name, config.rotator.repo_name.clone(), |c, v| {
            c.rotator.repo_name = v
        }),
        ("Schedule", args.schedule, config.schedule.expression.clone(), |c, v| {
            c.schedule.expression = v
        }),
    ];

    for (prompt, given, default, set) in fields {
        let value = ask(&config, prompt, given, default, set, interactive)?;
        set(&mut config, value);
    }

    config.debug.enabled = if args.no_debug {
        false
    } else if interactive {
        Confirm::new()
            .with_prompt(format!(
                "Also deploy a debug function from {}?",
                config.debug.source.path().display()
            ))
            .default(true)
            .interact()?
    } else {
        true
    };

    config.validate()?;

    let output_path = &args.output;
    if output_path.exists() && !args.force {
        if !interactive {
            bail!(
                "{} already exists. Use --force to overwrite.",
                output_path.display()
            );
        }
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "{} already exists. Overwrite?",
                output_path.display()
            ))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    let content = render(&config)?;
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    println!();
    println!("Created {}", output_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Build the rotator into {}", config.function.artifact.display());
    println!("  2. Review the stack:");
    println!("     keyrotator-infra --config {} check", output_path.display());
    println!("  3. Synthesize:");
    println!("     keyrotator-infra --config {} synth", output_path.display());
    println!();

    Ok(())
}

fn render(config: &StackConfig) -> Result<String> {
    Ok(format!(
        "# Access key rotator stack\n\
         # Values here are overridden by KEYROTATOR_* variables and -c key=value.\n\n{}",
        config.to_toml()?
    ))
}

/// Use the flag value when given, otherwise prompt (or take the default).
/// Every answer is checked by validating a copy of the config with it set.
fn ask(
    config: &StackConfig,
    prompt: &str,
    given: Option<String>,
    default: String,
    set: Setter,
    interactive: bool,
) -> Result<String> {
    let check = |input: &String| -> Result<(), String> {
        let mut candidate = config.clone();
        set(&mut candidate, input.trim().to_string());
        candidate.validate().map_err(|e| e.to_string())?;
        candidate
            .schedule
            .expression
            .parse::<ScheduleExpression>()
            .map(|_| ())
            .map_err(|e| e.to_string())
    };

    if let Some(value) = given {
        check(&value).map_err(|e| anyhow!("Invalid value for '{}': {}", prompt, e))?;
        return Ok(value.trim().to_string());
    }
    if !interactive {
        return Ok(default);
    }

    let value: String = Input::new()
        .with_prompt(prompt)
        .default(default)
        .allow_empty(true)
        .validate_with(check)
        .interact_text()?;
    Ok(value.trim().to_string())
}
