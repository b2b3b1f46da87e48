use std::env;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use infomax::config::{RunConfig, TEMPLATE};
use infomax::run::run;

#[derive(Parser)]
#[command(name = "binica")]
#[command(about = "Infomax and extended-Infomax ICA of raw float recordings", long_about = None)]
struct Cli {
    /// Run script, read from standard input when omitted
    script: Option<PathBuf>,

    /// Print a sample run script and exit
    #[arg(long)]
    template: bool,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("binica: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if cli.template {
        print!("{}", TEMPLATE);
        return Ok(());
    }

    let script = match &cli.script {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading run script {}", path.display()))?,
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                bail!("expects a run script as argument or redirected input, see --template");
            }
            let mut script = String::new();
            stdin
                .lock()
                .read_to_string(&mut script)
                .context("reading run script from standard input")?;
            script
        }
    };

    let config = RunConfig::from_script(&script).context("invalid run script")?;

    if !config.verbose && env::var_os("RUST_LOG").is_none() {
        log::set_max_level(LevelFilter::Warn);
    }

    let model = run(&config)
        .with_context(|| format!("decomposing {}", config.data_file.display()))?;

    log::info!(
        "done: {} components, {} steps ({:?}), final lrate {:e}",
        model.ncomponents(),
        model.steps(),
        model.status(),
        model.lrate()
    );
    Ok(())
}
