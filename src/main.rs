use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use ocidelta::{build_delta, exit_code_for, DeltaOptions, Notifier};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(help = "Path to the base image archive tarball")]
    base: PathBuf,

    #[arg(help = "Path to the update image archive tarball")]
    update: PathBuf,

    #[arg(long, help = "Image reference the recipe's FROM line should name")]
    base_ref: String,

    #[arg(
        long,
        default_value = "./.ocidelta-workdir",
        help = "Scratch directory for intermediate extraction"
    )]
    workdir: PathBuf,

    #[arg(
        short,
        long,
        default_value = "./delta",
        help = "Output directory for the synthesized delta"
    )]
    output: PathBuf,

    #[arg(
        long,
        default_value_t = 128,
        help = "Layer-count ceiling the projected recipe must not exceed"
    )]
    max_layers: usize,

    #[arg(
        long,
        help = "Accept a delta that is not smaller than the update's own tail payload"
    )]
    accept_bigger: bool,

    #[arg(long, help = "Do not remove the scratch directory on success")]
    keep_workdir: bool,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    let notifier = Notifier::new(cli.verbose);

    let options = DeltaOptions {
        max_layers: cli.max_layers,
        accept_bigger: cli.accept_bigger,
        keep_workdir: cli.keep_workdir,
    };

    if let Err(err) = run(&cli, &options, &notifier) {
        notifier.warn(&format!("{:#}", err));
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: &Cli, options: &DeltaOptions, notifier: &Notifier) -> Result<()> {
    let outcome = build_delta(
        &cli.base,
        &cli.update,
        &cli.base_ref,
        &cli.workdir,
        &cli.output,
        options,
        notifier,
    )?;

    notifier.info(&format!(
        "Delta written to {} ({} shared layer(s), {} recipe line(s))",
        outcome.dockerfile_path.parent().unwrap_or(&outcome.dockerfile_path).display(),
        outcome.shared_layers,
        outcome.recipe_lines.len(),
    ));

    Ok(())
}
