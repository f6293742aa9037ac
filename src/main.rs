use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command as ClapCommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use hwgen::builtin::clang_templates;
use hwgen::{Channel, HeaderGenerator, TemplateError, TemplateSet};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let matches = ClapCommand::new("hwgen")
        .version("0.1.0")
        .about("Generate C HTTP request macros for a device channel")
        .arg(
            Arg::new("channel")
                .help("Channel definition (JSON)")
                .required_unless_present("list-keys")
                .index(1),
        )
        .arg(
            Arg::new("templates")
                .short('t')
                .long("templates")
                .help("Template definition file (defaults to the built-in clang.h)"),
        )
        .arg(
            Arg::new("key")
                .short('k')
                .long("key")
                .help("Template key to expand, in output order (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Header file to write (defaults to stdout)"),
        )
        .arg(
            Arg::new("guard")
                .long("guard")
                .help("Wrap the output in an include guard with this name"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Reject channels that fail validation")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-keys")
                .long("list-keys")
                .help("Print the template keys and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity")
                .action(ArgAction::Count),
        )
        .get_matches();

    init_logging(matches.get_count("verbose"));

    let templates = match matches.get_one::<String>("templates") {
        Some(path) => TemplateSet::load(&PathBuf::from(path))
            .with_context(|| format!("failed to load templates from {}", path))?,
        None => clang_templates().context("built-in templates are invalid")?,
    };

    if matches.get_flag("list-keys") {
        let mut stdout = io::stdout().lock();
        for key in templates.keys() {
            writeln!(stdout, "{}", key)?;
        }
        return Ok(());
    }

    let channel_path = matches
        .get_one::<String>("channel")
        .context("missing channel definition")?;
    let channel = Channel::load(&PathBuf::from(channel_path))
        .with_context(|| format!("failed to read channel {}", channel_path))?;

    let issues = channel.validate();
    if !issues.is_empty() {
        if matches.get_flag("strict") {
            return Err(TemplateError::InvalidChannel(issues).into());
        }
        for issue in &issues {
            warn!(%issue, "channel validation");
        }
    }

    let mut generator = HeaderGenerator::new(&templates);
    if let Some(keys) = matches.get_many::<String>("key") {
        generator = generator.keys(keys.cloned());
    }
    if let Some(guard) = matches.get_one::<String>("guard") {
        generator = generator.include_guard(guard.clone());
    }
    let header = generator.generate(&channel)?;

    match matches.get_one::<String>("output") {
        Some(path) => {
            fs::write(path, &header).with_context(|| format!("failed to write {}", path))?;
            debug!(path = %path, "wrote header");
        }
        None => io::stdout().write_all(header.as_bytes())?,
    }

    Ok(())
}
