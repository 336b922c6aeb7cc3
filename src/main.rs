use std::process::ExitCode;

fn main() -> ExitCode {
    match brainscan::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} failed to start: {e}", brainscan::config::APP_NAME);
            ExitCode::FAILURE
        }
    }
}
