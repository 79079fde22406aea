use clap::Parser;
use tokencap::cli::{budget, handle_config_init, BudgetCommands, Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Serve(args) => tokencap::cli::serve::run_serve(args).await,
        Commands::Config(ConfigCommands::Init(args)) => handle_config_init(&args),
        Commands::Budget(cmd) => match cmd {
            BudgetCommands::Get(args) => budget::handle_get(&args),
            BudgetCommands::Set(args) => budget::handle_set(&args),
            BudgetCommands::Reset(args) => budget::handle_reset(&args),
            BudgetCommands::Delete(args) => budget::handle_delete(&args),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
