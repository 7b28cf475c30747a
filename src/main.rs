use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    datadump_lib::run(std::env::args().skip(1).collect()).await
}
