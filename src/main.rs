use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use vcxninja::WorkspaceBuilder;

/// Generate a ninja build file from a Visual Studio solution.
#[derive(Parser, Debug)]
#[command(name = "vcxninja")]
#[command(author, version, about)]
struct Cli {
    /// Directory holding exactly one .sln file
    #[arg(long)]
    build: PathBuf,

    /// Ninja binary invoked by the rewritten projects
    #[arg(long)]
    ninja: Option<String>,

    /// CMake binary used by the link rules
    #[arg(long, default_value = "cmake")]
    cmake: String,

    /// Write build.ninja only; leave project and solution files untouched
    #[arg(long)]
    dry: bool,

    /// Debug logging, and print the generated build file
    #[arg(short, long)]
    verbose: bool,

    /// Inputs for custom steps of a target that declares none: target=a,b
    #[arg(long = "deps", value_name = "TARGET=INPUTS")]
    deps: Vec<String>,

    /// Configuration emitted first
    #[arg(long, value_name = "NAME")]
    preferred_config: Option<String>,
}

fn run(cli: Cli) -> vcxninja::Result<()> {
    let mut builder = WorkspaceBuilder::new().cmake(cli.cmake).dry_run(cli.dry);
    if let Some(ninja) = cli.ninja {
        builder = builder.ninja(ninja);
    }
    if let Some(config) = cli.preferred_config {
        builder = builder.preferred_configuration(config);
    }
    for assignment in &cli.deps {
        builder = builder.dependency(assignment)?;
    }

    let contents = builder.open(&cli.build)?.write()?;
    if cli.verbose {
        println!("{contents}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    if cli.dry {
        tracing::info!("dry run");
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
