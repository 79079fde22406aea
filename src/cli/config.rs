//! `tokencap config init`

use crate::cli::ConfigInitArgs;
use std::fs;

const EXAMPLE_CONFIG: &str = r#"[server]
host = "0.0.0.0"
port = 8000
request_timeout_seconds = 300
max_concurrent_requests = 1000

[logging]
level = "info"
format = "pretty"
enable_content_logging = false

[credentials]
# openai_api_key = "sk-..."
# anthropic_api_key = "sk-ant-..."

database_path = "./tokencap.db"
default_project_id = "default"
default_max_output_tokens = 4096
"#;

pub fn handle_config_init(args: &ConfigInitArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.output.exists() && !args.force {
        return Err(format!(
            "file already exists: {}. pass --force to overwrite.",
            args.output.display()
        )
        .into());
    }

    fs::write(&args.output, EXAMPLE_CONFIG)?;
    println!("wrote {}", args.output.display());
    Ok(())
}
