//! `garage` command line.
//!
//! Every invocation loads the layered configuration, opens the file-backed
//! stores, signs the configured owner in and waits for the garage to load
//! before running one command.
//!
//! ## Commands
//!
//! - `garage bikes list|add`
//! - `garage services list|add`
//! - `garage reminders list|add|rm`
//! - `garage tech list|add|rm`
//! - `garage status`

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use garage_core::image::{JpegCompressor, PhotoUpload};
use garage_core::model::{
    NewMotorcycle, NewReminder, NewServiceLog, NewTechData, OwnerId, Reminder, ServiceLog,
    TechData,
};
use garage_core::state::{DeletableRecord, DependentRecord};
use garage_core::store::{FileBlobStore, FileRecordStore};
use garage_core::{ConfigLoader, GarageConfig, GarageController};
use serde::Serialize;

use crate::render::Line;

#[derive(Debug, Parser)]
#[command(name = "garage", version, about = "Track motorcycle maintenance")]
pub struct Cli {
    /// Directory holding config.toml (overrides $GARAGE_HOME).
    #[arg(long, global = true)]
    pub config_home: Option<PathBuf>,

    /// Data directory for records and photos.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Owner to sign in as.
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Motorcycle to select instead of the default one.
    #[arg(long, short = 'b', global = true)]
    pub bike: Option<String>,

    /// Output as JSON.
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Motorcycles in the garage.
    Bikes(BikesCli),
    /// Service history of the selected motorcycle.
    Services(ServicesCli),
    /// Maintenance reminders of the selected motorcycle.
    Reminders(RemindersCli),
    /// Technical data of the selected motorcycle.
    Tech(TechCli),
    /// Show configuration and a summary of the garage.
    Status,
}

#[derive(Debug, Parser)]
pub struct BikesCli {
    #[command(subcommand)]
    pub command: BikesSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum BikesSubcommand {
    List,
    /// Add a motorcycle and select it.
    Add(AddBikeArgs),
}

#[derive(Debug, Parser)]
pub struct AddBikeArgs {
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub nickname: String,

    /// Photo to downscale and attach.
    #[arg(long)]
    pub photo: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct ServicesCli {
    #[command(subcommand)]
    pub command: ServicesSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ServicesSubcommand {
    List,
    Add(AddServiceArgs),
}

#[derive(Debug, Parser)]
pub struct AddServiceArgs {
    /// Service date (YYYY-MM-DD).
    #[arg(long)]
    pub date: NaiveDate,

    #[arg(long)]
    pub mileage: u32,

    /// Kind of service, e.g. "Oil change".
    #[arg(long = "type")]
    pub service_type: String,

    #[arg(long, default_value = "")]
    pub parts: String,

    #[arg(long, default_value_t = 0.0)]
    pub parts_cost: f64,

    #[arg(long, default_value_t = 0.0)]
    pub labor_cost: f64,

    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Debug, Parser)]
pub struct RemindersCli {
    #[command(subcommand)]
    pub command: RemindersSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum RemindersSubcommand {
    List,
    Add {
        description: String,
        /// When it is due, e.g. "in 3,000 km".
        due: String,
    },
    Rm {
        id: String,
    },
}

#[derive(Debug, Parser)]
pub struct TechCli {
    #[command(subcommand)]
    pub command: TechSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum TechSubcommand {
    List,
    Add {
        /// What the value describes, e.g. "Tyre pressure".
        data_type: String,
        value: String,
    },
    Rm {
        id: String,
    },
}

/// Resolve configuration: defaults, file, environment, then flags.
pub fn load_config(cli: &Cli) -> anyhow::Result<GarageConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(home) = &cli.config_home {
        loader = loader.with_config_home(home.clone());
    }
    let mut config = loader.load().context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(owner) = &cli.owner {
        config.owner = Some(OwnerId::new(owner.clone()));
    }
    Ok(config)
}

/// Log to stderr, filtered by `RUST_LOG` or else the configured filter.
fn init_tracing(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_controller(config: &GarageConfig) -> anyhow::Result<GarageController> {
    let records = FileRecordStore::new(config.data_dir.clone()).with_context(|| {
        format!("Failed to open record store at {}", config.data_dir.display())
    })?;
    let blobs = FileBlobStore::new(config.data_dir.clone()).with_context(|| {
        format!("Failed to open blob store at {}", config.data_dir.display())
    })?;
    Ok(GarageController::new(
        Arc::new(records),
        Arc::new(blobs),
        Arc::new(JpegCompressor),
        config.image,
    ))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    init_tracing(&config.log_filter);
    tracing::debug!("Using data directory {}", config.data_dir.display());

    let controller = open_controller(&config)?;
    let out = Output { json: cli.json };

    if matches!(cli.command, Command::Status) {
        controller.session_transition(config.owner.clone()).await;
        return out.status(&config, &controller);
    }

    let Some(owner) = config.owner.clone() else {
        bail!("No owner configured; pass --owner or set GARAGE_OWNER");
    };
    controller.session_transition(Some(owner)).await;
    if let Some(bike) = &cli.bike
        && !controller.select(Some(bike.as_str())).await
    {
        bail!("Unknown motorcycle: {bike}");
    }

    match cli.command {
        Command::Bikes(bikes) => match bikes.command {
            BikesSubcommand::List => out.motorcycles(&controller),
            BikesSubcommand::Add(args) => add_bike(&controller, &out, args).await,
        },
        Command::Services(services) => match services.command {
            ServicesSubcommand::List => out.dependents::<ServiceLog>(&controller),
            ServicesSubcommand::Add(args) => {
                let draft = NewServiceLog {
                    date: args.date,
                    mileage: args.mileage,
                    service_type: args.service_type,
                    parts_used: args.parts,
                    parts_cost: args.parts_cost,
                    labor_cost: args.labor_cost,
                    notes: args.notes,
                };
                add_dependent::<ServiceLog>(&controller, &out, draft).await
            }
        },
        Command::Reminders(reminders) => match reminders.command {
            RemindersSubcommand::List => out.dependents::<Reminder>(&controller),
            RemindersSubcommand::Add { description, due } => {
                let draft = NewReminder {
                    description,
                    due_info: due,
                };
                add_dependent::<Reminder>(&controller, &out, draft).await
            }
            RemindersSubcommand::Rm { id } => remove_dependent::<Reminder>(&controller, &out, &id).await,
        },
        Command::Tech(tech) => match tech.command {
            TechSubcommand::List => out.dependents::<TechData>(&controller),
            TechSubcommand::Add { data_type, value } => {
                let draft = NewTechData { data_type, value };
                add_dependent::<TechData>(&controller, &out, draft).await
            }
            TechSubcommand::Rm { id } => remove_dependent::<TechData>(&controller, &out, &id).await,
        },
        Command::Status => Ok(()),
    }
}

async fn add_bike(
    controller: &GarageController,
    out: &Output,
    args: AddBikeArgs,
) -> anyhow::Result<()> {
    let photo = match &args.photo {
        Some(path) => Some(
            PhotoUpload::from_path(path)
                .with_context(|| format!("Failed to read photo {}", path.display()))?,
        ),
        None => None,
    };
    let draft = NewMotorcycle {
        brand: args.brand,
        model: args.model,
        year: args.year,
        nickname: args.nickname,
    };
    let Some(bike) = controller.create_motorcycle(draft, photo).await? else {
        bail!("No owner signed in");
    };
    out.created(&bike, || render::motorcycle_line(&bike, true))
}

async fn add_dependent<T: DependentRecord + Line>(
    controller: &GarageController,
    out: &Output,
    draft: T::Draft,
) -> anyhow::Result<()> {
    let Some(record) = controller.create_dependent::<T>(draft).await? else {
        bail!("No motorcycle selected; add one with `garage bikes add`");
    };
    out.created(&record, || record.line())
}

async fn remove_dependent<T: DeletableRecord>(
    controller: &GarageController,
    out: &Output,
    id: &str,
) -> anyhow::Result<()> {
    controller.delete_dependent::<T>(id).await?;
    if out.json {
        out.print_json(&serde_json::json!({ "deleted": id, "collection": T::KIND.as_str() }))
    } else {
        println!("Deleted {} {id}", T::KIND);
        Ok(())
    }
}

/// Human or JSON printing of command results.
struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
        println!("{text}");
        Ok(())
    }

    fn created<T: Serialize>(&self, value: &T, line: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            self.print_json(value)
        } else {
            println!("Created {}", line());
            Ok(())
        }
    }

    fn motorcycles(&self, controller: &GarageController) -> anyhow::Result<()> {
        let state = controller.snapshot();
        if self.json {
            return self.print_json(state.motorcycles());
        }
        print!("{}", render::motorcycles(&state));
        Ok(())
    }

    fn dependents<T: DependentRecord + Line>(&self, controller: &GarageController) -> anyhow::Result<()> {
        let state = controller.snapshot();
        if self.json {
            return self.print_json(state.dependents::<T>());
        }
        print!("{}", render::dependents::<T>(&state));
        Ok(())
    }

    fn status(&self, config: &GarageConfig, controller: &GarageController) -> anyhow::Result<()> {
        let state = controller.snapshot();
        if self.json {
            return self.print_json(&render::status_json(config, &state));
        }
        print!("{}", render::status(config, &state));
        Ok(())
    }
}
