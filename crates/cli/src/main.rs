use std::process::ExitCode;

fn main() -> ExitCode {
    aquaclaim_cli::run()
}
