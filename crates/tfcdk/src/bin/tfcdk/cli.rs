//! tfcdk cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tfcdk ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize all stacks into terraform json
    ///
    /// Writes one `cdk.tf.json` per stack and a `manifest.json` into the output directory
    Synth(SynthCommand),

    /// Check the construct tree and print every problem found
    Validate(ValidateCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Construct tree declaration
    ///
    /// Reads from stdin when not given
    #[clap(short = 'f', long = "input-file")]
    pub file: Option<PathBuf>,

    /// Format of the declaration, guessed from the file extension when not given
    #[arg(short = 'F', long = "input-format")]
    pub format: Option<InputFormat>,
}

#[derive(Parser, Debug)]
pub struct SynthCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Output directory, overrides the outdir of the declaration
    #[clap(short = 'o', long = "output")]
    pub outdir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ValidateCommand {
    #[clap(flatten)]
    pub input: InputArgs,
}

#[derive(ValueEnum, Clone, Copy, Default, Debug, PartialEq)]
pub enum InputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InputFormat::Json => f.write_str("json"),
            InputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Construct tree with kinds and logical ids
    Tree,
    /// Token table
    Tokens,
}
