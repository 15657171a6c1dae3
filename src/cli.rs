//! Command-line interface for the magnifier explorer.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use magnifier_core::ExplorerConfig;

#[derive(Parser)]
#[command(name = "magnifier")]
#[command(about = "Interactive explorer for magnifier IR modules", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start an interactive session reading commands from stdin
    Repl {
        /// Modules to load before the first prompt
        modules: Vec<PathBuf>,

        #[command(flatten)]
        options: ExplorerOptions,
    },
    /// Load a module, run the given commands and print their output
    Run {
        module: PathBuf,

        /// Session command to run; may be repeated
        #[arg(short = 'c', long = "command", required = true)]
        commands: Vec<String>,

        #[command(flatten)]
        options: ExplorerOptions,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct ExplorerOptions {
    /// Refuse to inline callees with more instructions than this
    #[arg(long)]
    pub inline_limit: Option<usize>,

    /// Verify every function an operation produces
    #[arg(long)]
    pub verify: bool,
}

impl ExplorerOptions {
    pub fn config(&self) -> ExplorerConfig {
        let config = ExplorerConfig::default().with_verification(self.verify);
        match self.inline_limit {
            Some(limit) => config.with_inline_limit(limit),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_repeated_commands() {
        let cli = Cli::try_parse_from([
            "magnifier", "run", "m.ir", "-c", "lf", "--command", "pf 1", "--inline-limit", "8",
        ])
        .unwrap();
        let Command::Run { module, commands, options } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(module, PathBuf::from("m.ir"));
        assert_eq!(commands, ["lf", "pf 1"]);
        assert_eq!(options.config().inline.max_callee_insts, 8);
        assert!(!options.config().verify_after_mutation);
    }

    #[test]
    fn repl_defaults() {
        let cli = Cli::try_parse_from(["magnifier", "repl", "--verify"]).unwrap();
        let Command::Repl { modules, options } = cli.command else {
            panic!("expected repl");
        };
        assert!(modules.is_empty());
        assert_eq!(
            options.config(),
            ExplorerConfig::default().with_verification(true)
        );
    }
}
