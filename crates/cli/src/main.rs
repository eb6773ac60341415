use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use emr_core::config::data_dir_from_env_value;
use emr_core::constants::DEFAULT_PROPERTIES_FILE;
use emr_core::encounter_transaction::EncounterTransaction;
use emr_core::{
    AdtRequest, AdtService, AnyStore, Auditor, ConditionService, CoreConfig, Dictionary,
    DiagnosisMigrator, EmrApiProperties, EmrStore, EmrUuid, EncounterTransactionService,
    FileStore, StoreKind,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "emr")]
#[command(about = "EMR API command line tools")]
struct Cli {
    /// File store directory (defaults to EMR_DATA_DIR, then ./emr_data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Properties YAML (defaults to EMR_PROPERTIES_FILE, then config/emr-properties.yaml)
    #[arg(long, global = true)]
    properties: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed reference data from a dictionary YAML file
    Seed {
        dictionary: PathBuf,
    },
    /// Convert obs-encoded diagnoses into diagnosis records
    MigrateDiagnoses,
    /// List a patient's active conditions
    Conditions {
        patient: EmrUuid,
    },
    /// Show every revision of a patient's conditions
    ConditionHistory {
        patient: EmrUuid,
    },
    /// Save an encounter transaction from a JSON file
    SaveEncounter {
        file: PathBuf,
    },
    /// Print an encounter as an encounter transaction
    ShowEncounter {
        encounter: EmrUuid,
        #[arg(long)]
        include_voided: bool,
    },
    /// Admit a patient
    Admit {
        #[command(flatten)]
        movement: Movement,
        /// Bed to assign
        #[arg(long)]
        bed: Option<EmrUuid>,
    },
    /// Discharge a patient
    Discharge {
        #[command(flatten)]
        movement: Movement,
    },
}

#[derive(Clone, clap::Args)]
struct Movement {
    #[arg(long)]
    patient: EmrUuid,
    #[arg(long)]
    location: EmrUuid,
    #[arg(long)]
    provider: EmrUuid,
    /// RFC 3339 datetime (defaults to now)
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

impl Movement {
    fn into_request(self, bed: Option<EmrUuid>) -> AdtRequest {
        AdtRequest {
            patient: self.patient,
            location: self.location,
            datetime: self.at,
            provider: self.provider,
            bed,
        }
    }
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir
        .clone()
        .unwrap_or_else(|| data_dir_from_env_value(std::env::var("EMR_DATA_DIR").ok()))
}

/// Opens the file store and checks the properties against it.
fn open(cli: &Cli) -> Result<(Arc<CoreConfig>, Arc<AnyStore>), Box<dyn std::error::Error>> {
    let data_dir = data_dir(cli);
    let properties_file = cli.properties.clone().unwrap_or_else(|| {
        std::env::var("EMR_PROPERTIES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROPERTIES_FILE))
    });
    let properties = EmrApiProperties::load(&properties_file)?;
    let cfg = Arc::new(CoreConfig::new(data_dir, StoreKind::File, properties));
    let store = cfg.open_store()?;
    store.read(|records| cfg.properties().verify(records))?;
    Ok((cfg, Arc::new(store)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let auditor = Auditor::system();

    match &cli.command {
        Some(Commands::Seed { dictionary }) => {
            let store = FileStore::open(data_dir(&cli))?;
            match Dictionary::load(dictionary).and_then(|d| d.seed(&store)) {
                Ok(report) => println!(
                    "Seeded {} reference rows, {} patients, {} beds",
                    report.reference_rows, report.patients, report.beds
                ),
                Err(e) => eprintln!("Error seeding dictionary: {}", e),
            }
        }
        Some(Commands::MigrateDiagnoses) => {
            let (cfg, store) = open(&cli)?;
            match DiagnosisMigrator::new(cfg, store).migrate(&auditor) {
                Ok(report) => println!(
                    "Migrated {} diagnoses, skipped {} malformed groups",
                    report.migrated, report.skipped
                ),
                Err(e) => eprintln!("Error migrating diagnoses: {}", e),
            }
        }
        Some(Commands::Conditions { patient }) => {
            let (cfg, store) = open(&cli)?;
            match ConditionService::new(cfg, store).active_conditions(*patient) {
                Ok(conditions) if conditions.is_empty() => println!("No active conditions."),
                Ok(conditions) => {
                    for c in conditions {
                        println!(
                            "{}  {}  onset {}",
                            c.uuid,
                            c.condition_non_coded
                                .unwrap_or_else(|| c.concept.to_string()),
                            c.onset_date
                                .map(|d| d.date_naive().to_string())
                                .unwrap_or_else(|| "-".into())
                        );
                    }
                }
                Err(e) => eprintln!("Error listing conditions: {}", e),
            }
        }
        Some(Commands::ConditionHistory { patient }) => {
            let (cfg, store) = open(&cli)?;
            match ConditionService::new(cfg, store).condition_history(*patient) {
                Ok(history) => {
                    for group in history {
                        println!(
                            "{}",
                            group
                                .condition_non_coded
                                .unwrap_or_else(|| group.concept.to_string())
                        );
                        for c in group.conditions {
                            println!(
                                "  {}  {:?}  {} .. {}",
                                c.uuid,
                                c.status,
                                c.onset_date
                                    .map(|d| d.to_rfc3339())
                                    .unwrap_or_else(|| "-".into()),
                                c.end_date
                                    .map(|d| d.to_rfc3339())
                                    .unwrap_or_else(|| "-".into())
                            );
                        }
                    }
                }
                Err(e) => eprintln!("Error reading condition history: {}", e),
            }
        }
        Some(Commands::SaveEncounter { file }) => {
            let (cfg, store) = open(&cli)?;
            let text = std::fs::read_to_string(file)?;
            let transaction = EncounterTransaction::parse(&text)?;
            match EncounterTransactionService::new(cfg, store).save(&transaction, &auditor) {
                Ok(saved) => println!("{}", saved.render()?),
                Err(e) => eprintln!("Error saving encounter transaction: {}", e),
            }
        }
        Some(Commands::ShowEncounter {
            encounter,
            include_voided,
        }) => {
            let (cfg, store) = open(&cli)?;
            match EncounterTransactionService::new(cfg, store).get(*encounter, *include_voided) {
                Ok(transaction) => println!("{}", transaction.render()?),
                Err(e) => eprintln!("Error reading encounter: {}", e),
            }
        }
        Some(Commands::Admit { movement, bed }) => {
            let (cfg, store) = open(&cli)?;
            let request = movement.clone().into_request(*bed);
            match AdtService::new(cfg, store).admit(&request, &auditor) {
                Ok(encounter) => println!("Admitted: encounter {}", encounter.uuid),
                Err(e) => eprintln!("Error admitting patient: {}", e),
            }
        }
        Some(Commands::Discharge { movement }) => {
            let (cfg, store) = open(&cli)?;
            let request = movement.clone().into_request(None);
            match AdtService::new(cfg, store).discharge(&request, &auditor) {
                Ok(encounter) => println!("Discharged: encounter {}", encounter.uuid),
                Err(e) => eprintln!("Error discharging patient: {}", e),
            }
        }
        None => {
            println!("Use 'emr --help' for commands");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn admit_reads_movement_flags() {
        let cli = Cli::try_parse_from([
            "emr",
            "admit",
            "--patient",
            "90000000-0000-4000-8000-000000000001",
            "--location",
            "10000000-0000-4000-8000-000000000002",
            "--provider",
            "a0000000-0000-4000-8000-000000000001",
            "--bed",
            "b0000000-0000-4000-8000-000000000001",
            "--at",
            "2024-03-01T09:30:00Z",
        ])
        .unwrap();
        let Some(Commands::Admit { movement, bed }) = cli.command else {
            panic!("expected admit");
        };
        let request = movement.into_request(bed);
        assert!(request.bed.is_some());
        assert_eq!(
            request.datetime.map(|d| d.to_rfc3339()),
            Some("2024-03-01T09:30:00+00:00".to_string())
        );
    }

    #[test]
    fn uppercase_uuids_are_rejected() {
        assert!(Cli::try_parse_from([
            "emr",
            "conditions",
            "90000000-0000-4000-8000-00000000000A"
        ])
        .is_err());
    }
}
