mod cache;
mod cli;
mod config;
mod docker;
mod image;
mod lock;
mod probe;
mod runner;
mod services;

use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use image::ImageRef;
use runner::Suite;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                e.exit()
            }
            _ => {
                let _ = e.print();
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    match cli.command {
        Command::Build => run_build(&config),
        Command::Unit { marker } => run_suite_cmd(&config, Suite::Unit, marker),
        Command::Registry { marker } => run_suite_cmd(&config, Suite::Registry, marker),
        Command::RegistryOld { marker } => run_suite_cmd(&config, Suite::RegistryOld, marker),
        Command::CertsTest { marker } => run_suite_cmd(&config, Suite::Certs, marker),
        Command::GunicornTest => run_gunicorn(&config),
        Command::Mysql { marker } => run_suite_cmd(&config, Suite::Mysql, marker),
        Command::Postgres { marker } => run_suite_cmd(&config, Suite::Postgres, marker),
        Command::FailClean => run_fail_clean(&config),
        Command::Clean => run_clean(&config),
    }
}

fn run_build(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let image = ImageRef::from_config(config);
    println!("Building {}", image.reference());
    let path = image::build(config)?;
    println!("Cached image at {}", path.display());
    Ok(())
}

fn run_suite_cmd(
    config: &Config,
    suite: Suite,
    marker: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let marker = cli::shard_marker(marker);
    println!("Running {} (marker: {})", suite.target(), marker);
    runner::run_suite(config, suite, &marker)?;
    println!("Suite {} passed", suite.target());
    Ok(())
}

fn run_gunicorn(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    runner::run_gunicorn_test(config)?;
    println!("Gunicorn smoke test passed");
    Ok(())
}

fn run_fail_clean(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let image = ImageRef::from_config(config);
    let removed = cache::clean_on_failure(config, &image, config.test_result)?;
    if removed {
        println!("Removed cache archive after failed job");
    } else {
        println!("Cache archive left in place");
    }
    Ok(())
}

fn run_clean(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let image = ImageRef::from_config(config);
    let removed = cache::clean(config, &image)?;
    if removed {
        println!("Removed cache archive");
    } else {
        println!("No cache archive present");
    }
    Ok(())
}
