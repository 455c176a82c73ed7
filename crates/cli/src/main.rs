use clap::{Parser, Subcommand, ValueEnum};
use cdr_core::commands::{
    CheckRecordCommand, GetDemographicsCommand, GetHeadingDetailCommand,
    GetHeadingSummaryCommand, GetPatientSynopsisCommand, MergeDiscoveryDataCommand,
};
use cdr_core::config::{config_path_env, resolve_config_path};
use cdr_core::{CdrState, CoreConfig, Role, Session};
use cdr_types::NonEmptyText;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cdr")]
#[command(about = "CDR heading and discovery CLI")]
struct Cli {
    /// Configuration file (defaults to $CDR_CONFIG, then config/cdr.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Role to act as
    #[arg(long, global = true, value_enum, default_value_t = CliRole::Idcr)]
    role: CliRole,

    /// NHS number of the patient acting as themselves (phr-user role)
    #[arg(long, global = true)]
    nhs_number: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRole {
    Idcr,
    PhrUser,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Idcr => Role::Idcr,
            CliRole::PhrUser => Role::PhrUser,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the enabled headings and openEHR hosts
    Headings,
    /// Show a patient's demographics from the discovery service
    Demographics {
        /// NHS number
        patient_id: String,
    },
    /// Load a patient's record and show its state
    Record {
        /// NHS number
        patient_id: String,
    },
    /// Summarise one heading
    Summary {
        /// NHS number
        patient_id: String,
        /// Heading name
        heading: String,
    },
    /// Show one record in full
    Detail {
        /// NHS number
        patient_id: String,
        /// Heading name
        heading: String,
        /// Record source id (`<host>_<uid>`)
        source_id: String,
    },
    /// Synopsis of every enabled heading
    Synopsis {
        /// NHS number
        patient_id: String,
    },
    /// Merge discovery data for one heading
    Merge {
        /// NHS number
        patient_id: String,
        /// Heading name
        heading: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'cdr --help' for commands");
        return Ok(());
    };

    let config_path = cli
        .config
        .unwrap_or_else(|| resolve_config_path(std::env::var(config_path_env()).ok()));
    let cfg = CoreConfig::load(&config_path)?;

    if let Commands::Headings = command {
        println!("Headings: {}", cfg.headings().join(", "));
        println!("Hosts: {}", cfg.host_names().collect::<Vec<_>>().join(", "));
        println!("Default host: {}", cfg.default_host());
        return Ok(());
    }

    let state = CdrState::connect(cfg)?;
    let session_id = NonEmptyText::new(uuid::Uuid::new_v4().simple().to_string())?;
    let ctx = state.context(Session::new(session_id, cli.role.into(), cli.nhs_number));

    match command {
        Commands::Headings => {}
        Commands::Demographics { patient_id } => {
            print_json(
                &GetDemographicsCommand::new(&ctx)
                    .execute(Some(&patient_id))
                    .await?,
            )?;
        }
        Commands::Record { patient_id } => {
            print_json(&CheckRecordCommand::new(&ctx).execute(Some(&patient_id)).await?)?;
        }
        Commands::Summary {
            patient_id,
            heading,
        } => {
            print_json(
                &GetHeadingSummaryCommand::new(&ctx)
                    .execute(Some(&patient_id), Some(&heading))
                    .await?,
            )?;
        }
        Commands::Detail {
            patient_id,
            heading,
            source_id,
        } => {
            print_json(
                &GetHeadingDetailCommand::new(&ctx)
                    .execute(Some(&patient_id), Some(&heading), Some(&source_id))
                    .await?,
            )?;
        }
        Commands::Synopsis { patient_id } => {
            print_json(
                &GetPatientSynopsisCommand::new(&ctx)
                    .execute(Some(&patient_id))
                    .await?,
            )?;
        }
        Commands::Merge {
            patient_id,
            heading,
        } => {
            let result = MergeDiscoveryDataCommand::new(&ctx)
                .execute(Some(&patient_id), Some(&heading))
                .await?;
            if result.refresh {
                println!("Merged new discovery data into {heading}");
            } else {
                println!("No new discovery data for {heading}");
            }
        }
    }

    Ok(())
}
