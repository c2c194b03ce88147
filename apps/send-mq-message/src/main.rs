use clap::Parser;
use smq_send::cli::Cli;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // The local offset can only be read while the process is single-threaded.
    smq_core::local_offset();
    let cli = Cli::parse();
    smq_send::run(cli, &mut std::io::stdout()).await
}
