#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]

use std::{path::Path, process::ExitCode};

mod commands;
mod logging;

fn main() -> ExitCode {
    logging::init();

    let args = std::env::args().collect::<Vec<_>>();
    let executable = args.first().map_or("fatimg", String::as_str);

    let command = match args.get(1).map(String::as_str) {
        None => {
            eprint!("{}", commands::usage(executable));
            return ExitCode::FAILURE;
        }
        Some("-h" | "--help") => {
            print!("{}", commands::usage(executable));
            return ExitCode::SUCCESS;
        }
        Some(command) => command,
    };

    let Some((image, command_args)) = args[2..].split_last() else {
        eprintln!("{executable}: missing image path");
        eprint!("{}", commands::usage(executable));
        return ExitCode::FAILURE;
    };

    let mut stdout = std::io::stdout().lock();
    match commands::execute_command(command, command_args, Path::new(image), &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{executable}: {message}");
            ExitCode::FAILURE
        }
    }
}
