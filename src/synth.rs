//! `synth`: write the template, asset manifest and staged code assets

use anyhow::{bail, Context, Result};
use clap::Args;
use keyrotator_config::StackConfig;
use keyrotator_stack::{build_stack, pseudo, AssetPackaging, Stack, StackAssets, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MANIFEST_FILE: &str = "assets.json";
pub const DEFAULT_OUTPUT: &str = "cdk.out";

#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Directory receiving the template, asset manifest and staged zips
    #[arg(short, long, value_name = "DIR", default_value = "cdk.out")]
    pub output: PathBuf,

    /// Print the template to stdout instead of writing files
    #[arg(long)]
    pub stdout: bool,
}

/// Files written by [`write_assembly`]
#[derive(Debug)]
pub struct Assembly {
    pub template: PathBuf,
    pub manifest: PathBuf,
    pub staged: Vec<PathBuf>,
}

pub fn run(config: &StackConfig, args: SynthArgs) -> Result<()> {
    let assets = StackAssets::resolve(config).context("Failed to fingerprint code assets")?;
    let stack = build_stack(config, &assets).context("Failed to build stack")?;

    if args.stdout {
        println!("{}", stack.to_json_pretty()?);
        return Ok(());
    }

    let assembly = write_assembly(&stack, &assets, &args.output)?;
    print_next_steps(&stack, &assembly);
    Ok(())
}

/// Stage every asset, then write the asset manifest and `<stack>.template.json`
/// into `out_dir`.
pub fn write_assembly(stack: &Stack, assets: &StackAssets, out_dir: &Path) -> Result<Assembly> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;
    check_output_dir(assets, out_dir)?;

    let mut staged = Vec::new();
    for asset in assets.iter() {
        staged.push(
            asset
                .stage(out_dir)
                .with_context(|| format!("Failed to stage asset {}", asset.id))?,
        );
    }

    let manifest = out_dir.join(MANIFEST_FILE);
    let content = serde_json::to_string_pretty(&stack.manifest)?;
    fs::write(&manifest, content)
        .with_context(|| format!("Failed to write {}", manifest.display()))?;
    info!(path = %manifest.display(), assets = staged.len(), "Wrote asset manifest");

    // Template last: it is only present once everything it points at is staged
    let template = out_dir.join(format!("{}.template.json", stack.name));
    fs::write(&template, stack.to_json_pretty()?)
        .with_context(|| format!("Failed to write {}", template.display()))?;
    info!(path = %template.display(), "Wrote template");

    Ok(Assembly {
        template,
        manifest,
        staged,
    })
}

/// The output directory must not sit inside a directory that is zipped as
/// code: staged zips would end up in the archive and in the next fingerprint.
fn check_output_dir(assets: &StackAssets, out_dir: &Path) -> Result<()> {
    let out_dir = fs::canonicalize(out_dir)
        .with_context(|| format!("Failed to resolve {}", out_dir.display()))?;
    for asset in assets
        .iter()
        .filter(|asset| asset.packaging == AssetPackaging::ZipDirectory)
    {
        let source = fs::canonicalize(&asset.source)
            .with_context(|| format!("Failed to resolve {}", asset.source.display()))?;
        if out_dir.starts_with(&source) {
            bail!(
                "Output directory {} is inside {}, which is packaged as asset {}. \
                 Choose an output directory outside it.",
                out_dir.display(),
                source.display(),
                asset.id
            );
        }
    }
    Ok(())
}

fn print_next_steps(stack: &Stack, assembly: &Assembly) {
    println!();
    println!("Synthesized {} ({} assets)", stack.name, assembly.staged.len());
    println!();
    println!("Next steps:");
    println!("  1. Upload code assets:");
    for (entry, staged) in stack.manifest.files.iter().zip(&assembly.staged) {
        println!(
            "     aws s3 cp {} s3://{}/{}",
            staged.display(),
            shell_bucket(&entry.bucket),
            entry.object_key
        );
    }
    println!();
    println!("  2. Deploy:");
    println!("     aws cloudformation deploy \\");
    println!("       --template-file {} \\", assembly.template.display());
    println!("       --stack-name {} \\", stack.name);
    println!("       --capabilities CAPABILITY_IAM");
    println!();
}

/// Staging bucket as a user would type it; deploy-time parts become
/// placeholders.
fn shell_bucket(bucket: &Value) -> String {
    match bucket {
        Value::Sub(template) => template
            .replace(&format!("${{{}}}", pseudo::ACCOUNT_ID), "<account>")
            .replace(&format!("${{{}}}", pseudo::REGION), "<region>")
            .replace(&format!("${{{}}}", pseudo::PARTITION), "aws"),
        other => other.to_string(),
    }
}
