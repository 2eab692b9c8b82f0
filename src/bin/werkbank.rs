use std::{fs, path::{Path, PathBuf}, process::ExitCode};

use clap::{Parser, Subcommand};
use werkbank::{
    config::{self, EditorConfig},
    rules::check_definition,
    HttpWorkflowService, Severity, ValidationResult, WorkflowDefinition, WorkflowService,
};

#[derive(Parser)]
#[command(name = "werkbank")]
#[command(about = "Inspect, validate and normalise workflow definitions")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the local semantic checks
    Check {
        file: PathBuf,
    },
    /// Ask the workflow service to validate a definition
    Validate {
        file: PathBuf,
        /// Service base URL (defaults to WERKBANK_API_URL)
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Print the JSON Schema of a workflow definition
    Schema,
    /// Re-serialise a definition in canonical form
    Fmt {
        file: PathBuf,
        /// Emit JSON instead of YAML
        #[arg(long)]
        json: bool,
        /// Overwrite the file instead of printing
        #[arg(short, long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    config::init_tracing("warn");
    let args = Args::parse();

    match args.command {
        Command::Check { file } => {
            let definition = load(&file)?;
            let result = check_definition(&definition);
            Ok(report(&result))
        }
        Command::Validate { file, api_url } => {
            let definition = load(&file)?;
            let api_url = match api_url {
                Some(url) => url,
                None => EditorConfig::from_env()?.api_url,
            };
            let service = HttpWorkflowService::new(api_url)?;
            let result = service.validate(&definition).await?;
            Ok(report(&result))
        }
        Command::Schema => {
            let schema = WorkflowDefinition::json_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Fmt { file, json, write } => {
            let definition = load(&file)?;
            let output = if json {
                definition.to_json_string_pretty()?
            } else {
                definition.to_yaml_string()?
            };
            if write {
                fs::write(&file, output)?;
                eprintln!("formatted {}", file.display());
            } else {
                print!("{output}");
                if json {
                    println!();
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(path: &Path) -> Result<WorkflowDefinition, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
    let definition = if is_json {
        WorkflowDefinition::from_json_str(&content)?
    } else {
        WorkflowDefinition::from_yaml_str(&content)?
    };
    Ok(definition)
}

fn report(result: &ValidationResult) -> ExitCode {
    for issue in &result.issues {
        let level = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &issue.step_id {
            Some(step) => println!("{level} [{step}]: {}", issue.message),
            None => println!("{level}: {}", issue.message),
        }
    }
    println!(
        "{} ({} error(s), {} warning(s))",
        if result.valid { "valid" } else { "invalid" },
        result.error_count(),
        result.warning_count()
    );
    if result.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
