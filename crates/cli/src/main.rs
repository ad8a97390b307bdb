use std::process::ExitCode;

fn main() -> ExitCode {
    checksweep_cli::run()
}
