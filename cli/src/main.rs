use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::roundtrip::command_roundtrip;
use crate::commands::show::command_show;
use crate::commands::strings::command_strings;
use crate::commands::xml::command_xml;

mod commands;

#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    commands: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a resource table: packages, types, configurations, entries
    Show {
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Dump the string pools of a container
    Strings {
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Dump the node stream of a compiled XML file
    Xml {
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Parse, re-serialize and compare byte for byte
    Roundtrip {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match &cli.commands {
        Some(Commands::Show { path }) => command_show(path),
        Some(Commands::Strings { path }) => command_strings(path),
        Some(Commands::Xml { path }) => command_xml(path),
        Some(Commands::Roundtrip { paths }) => command_roundtrip(paths),
        None => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}
