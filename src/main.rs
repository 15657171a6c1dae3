//! magnifier CLI entry point.

mod cli;

use std::io::{BufRead, Write};

use clap::Parser;
use cli::{Cli, Command};
use magnifier::logging::init_logging;
use magnifier::{Outcome, Session};

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Repl { modules, options } => {
            let mut session = Session::new(options.config());
            for path in &modules {
                if let Err(message) = session.load_file(path) {
                    eprintln!("{message}");
                    std::process::exit(1);
                }
            }
            if let Err(e) = repl(&mut session) {
                eprintln!("I/O error: {e}");
                std::process::exit(1);
            }
        }
        Command::Run {
            module,
            commands,
            options,
        } => {
            let mut session = Session::new(options.config());
            if let Err(message) = session.load_file(&module) {
                eprintln!("{message}");
                std::process::exit(1);
            }
            for command in &commands {
                match session.execute(command) {
                    Outcome::Output(text) => print!("{text}"),
                    Outcome::Exit => break,
                }
            }
        }
    }
}

fn repl(session: &mut Session) -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut line = String::new();
    loop {
        write!(stdout, ">> ")?;
        stdout.flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match session.execute(&line) {
            Outcome::Output(text) => write!(stdout, "{text}")?,
            Outcome::Exit => return Ok(()),
        }
    }
}
