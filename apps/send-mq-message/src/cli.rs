use clap::Parser;
use smq_core::CONFIG_PATH_ENV;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "send-mq-message",
    version,
    about = "Send tagged messages to a request queue and print the correlated replies",
    after_help = "Env: MFG_MQ_INI (default: SendMQMessage.toml next to the executable) -> path to the config file\n     RUST_LOG (default: info) -> log filter"
)]
pub struct Cli {
    /// Config file; overrides MFG_MQ_INI
    #[arg(long, short = 'c', env = CONFIG_PATH_ENV, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// <applicationTag> <message> [...moreMessages]; empty to read the resource directory in file mode
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
