use clap::Parser;
use pepper::error::GetExitCode;

fn main() {
    let args = pepper::Args::parse();
    let default_filter = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let stderr = std::io::stderr();
    let result = pepper::run(stderr, args);
    std::process::exit(result.get_exit_code())
}
