use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    goaltracker::run().await
}
