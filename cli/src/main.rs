mod commands;
mod terminal;

use commands::{CommandLine, Commands, Session, bandwidth, expand, export, scan};
use frontscan_common::error;
use terminal::{input, logging, print};

#[tokio::main]
async fn main() {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose);
    print::banner(commands.quiet);

    let result: anyhow::Result<()> = run(&commands).await;
    if let Err(e) = &result {
        error!("{e:#}");
    }

    match ending(&result, commands.no_wait) {
        Ending::Fatal => std::process::exit(1),
        Ending::Done { wait } => {
            print::end_of_program();
            if wait {
                input::wait_for_key();
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Ending {
    /// Terminate right away, without the footer or the key prompt.
    Fatal,
    Done { wait: bool },
}

fn ending(result: &anyhow::Result<()>, no_wait: bool) -> Ending {
    match result {
        Err(_) => Ending::Fatal,
        Ok(()) => Ending::Done { wait: !no_wait },
    }
}

async fn run(commands: &CommandLine) -> anyhow::Result<()> {
    match &commands.command {
        Some(Commands::Expand { tokens }) => {
            print::header("expanding ranges", commands.quiet);
            expand::expand(tokens, commands.quiet)
        }
        Some(Commands::Bandwidth) => {
            let session = Session::open(commands)?;
            bandwidth::run(&session).await
        }
        Some(Commands::Export) => {
            let session = Session::open(commands)?;
            export::export(&session).await
        }
        Some(Commands::Scan) | None => {
            let session = Session::open(commands)?;
            scan::scan(&session).await
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_error_skips_the_key_prompt() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("Could not load the CA bundle"));
        assert_eq!(ending(&result, false), Ending::Fatal);
        assert_eq!(ending(&result, true), Ending::Fatal);
    }

    #[test]
    fn test_normal_completion_waits_unless_told_not_to() {
        assert_eq!(ending(&Ok(()), false), Ending::Done { wait: true });
        assert_eq!(ending(&Ok(()), true), Ending::Done { wait: false });
    }
}
