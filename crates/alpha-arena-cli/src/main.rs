use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    alpha_arena_cli::run().await
}
