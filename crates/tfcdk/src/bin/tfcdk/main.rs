mod cli;
mod declaration;

use std::path::Path;
use tfcdk::app::App;
use tfcdk::construct;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFCDK_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Synth(synth_cli) => synth(synth_cli),
        cli::Command::Validate(validate_cli) => validate(validate_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn synth(cli: cli::SynthCommand) -> anyhow::Result<()> {
    let outdir = cli.outdir.map(|dir| dir.to_string_lossy().into_owned());
    let app = load(&cli.input, outdir)?;

    let manifest = app.synth()?;
    for stack in manifest.stacks.values() {
        println!(
            "{}: {}",
            stack.name,
            Path::new(app.outdir())
                .join(&stack.synthesized_stack_path)
                .display()
        );
    }

    Ok(())
}

pub fn validate(cli: cli::ValidateCommand) -> anyhow::Result<()> {
    let app = load(&cli.input, None)?;

    if let Err(errors) = app.validate() {
        for error in errors.errors() {
            println!("{error}");
        }
        anyhow::bail!("{} validation error(s)", errors.len());
    }

    println!("construct tree is valid");
    Ok(())
}

fn load(input: &cli::InputArgs, outdir: Option<String>) -> anyhow::Result<App> {
    let (source, format) = match &input.file {
        Some(file_path) => {
            let file_path = file_path.canonicalize()?;
            tracing::info!(path=%file_path.display(), "loading file");

            let format = input.format.unwrap_or_else(|| guess_format(&file_path));
            (std::fs::read_to_string(&file_path)?, format)
        }
        None => (
            std::io::read_to_string(std::io::stdin())?,
            input.format.unwrap_or_default(),
        ),
    };

    let raw = declaration::parse(&source, format)?;
    declaration::load(raw, outdir)
}

fn guess_format(file_path: &Path) -> cli::InputFormat {
    match file_path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => cli::InputFormat::Json,
        _ => cli::InputFormat::Yaml,
    }
}

/// (tfcdk-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let app = load(&cli.input, None)?;

    match cli.command {
        Tree => {
            construct::walk_tree(app.root(), |node, depth| {
                println!(
                    "{:indent$}{} ({}) {}",
                    "",
                    node.id(),
                    node.kind(),
                    node.fqn().unwrap_or_default(),
                    indent = depth * 2
                );
            });
        }
        Tokens => {
            for (index, token) in app.tokens().iter() {
                println!("{index}: {token:?} -> {}", app.tokens().token_to_string(token));
            }
        }
    }

    Ok(())
}
