fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let code = ink_cli::run_cli_from_args(std::env::args_os());
    std::process::exit(code);
}
