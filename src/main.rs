use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match vallum::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vallum: {err}");
            ExitCode::FAILURE
        }
    }
}
