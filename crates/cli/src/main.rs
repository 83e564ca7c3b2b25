use std::process::ExitCode;

fn main() -> ExitCode {
    peptalk_cli::run()
}
