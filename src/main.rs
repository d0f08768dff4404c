use clap::Parser;
use mapdl_warden::commands::{self, Cli, Commands};
use mapdl_warden::error::WardenResult;
use mapdl_warden::utils::config_paths::{ConfigPaths, UserConfig};
use mapdl_warden::utils::logger::init_logger;
use std::path::Path;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // without a home directory, fall back to ./.mapdl-warden
    let paths = ConfigPaths::new().unwrap_or_else(|_| ConfigPaths::with_home(Path::new(".")));
    let user_config = &paths.user_config;

    let fallback = user_config.log_level.as_deref().unwrap_or("warn");
    if let Err(err) = init_logger(cli.log_level.as_deref(), fallback) {
        eprintln!("Failed to initialise logging: {err}");
    }

    match run(cli.command, user_config, &paths.credentials_file).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, category = err.category().display_name(), "command failed");
            commands::print_error(err.user_message());
            ExitCode::from(1)
        }
    }
}

async fn run(
    command: Commands,
    user_config: &UserConfig,
    credentials_file: &Path,
) -> WardenResult<()> {
    match command {
        Commands::List(args) => commands::list::execute(&args, user_config.matcher()),
        Commands::Stop(args) => commands::stop::execute(&args, user_config.matcher()),
        Commands::Start(args) => commands::start::execute(&args, user_config),
        Commands::Port { port } => commands::port::execute(port),
        Commands::Login(args) => commands::login::login(&args, credentials_file).await,
        Commands::Logout(args) => commands::login::logout(&args, credentials_file),
        Commands::Submit(args) => commands::submit::execute(&args, credentials_file).await,
    }
}
