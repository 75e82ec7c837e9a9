use std::process::ExitCode;

fn main() -> ExitCode {
    match stagehand::cli::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
