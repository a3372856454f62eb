// ==============================================================================
// main.rs - Regulome Scorer Entry Point
// ==============================================================================
// Description: Command-line entry point for feature extraction and organ scoring
// Author: Matt Barham
// Created: 2026-09-02
// Modified: 2026-10-12
// Version: 1.2.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regulome_scorer::class_merge::AllNullPolicy;
use regulome_scorer::config::{GenericInputs, ModelInputs, OrganInputs, OutputLayout, PipelineConfig};
use regulome_scorer::join::JoinKind;
use regulome_scorer::output;
use regulome_scorer::parsers::OrganTotals;
use regulome_scorer::predictor::DispatchError;
use regulome_scorer::processor::{self, FeaturePipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the generic feature matrix (Parquet)
    Generic {
        #[command(flatten)]
        generic: GenericArgs,

        /// Annotation JSON Lines file
        #[arg(long, env = "REGULOME_ANNOTATIONS")]
        annotations: PathBuf,

        /// Output Parquet file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Build the organ-specific feature table for one organ (Parquet)
    Organ {
        #[command(flatten)]
        organ_args: OrganArgs,

        /// Annotation JSON Lines file
        #[arg(long, env = "REGULOME_ANNOTATIONS")]
        annotations: PathBuf,

        /// Organ name
        #[arg(long)]
        organ: String,

        /// Output Parquet file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Score variants for one organ from precomputed feature tables
    Predict {
        #[command(flatten)]
        models: ModelArgs,

        /// Generic features Parquet
        #[arg(long)]
        generic_features: PathBuf,

        /// Organ-specific features Parquet
        #[arg(long)]
        organ_features: PathBuf,

        /// Organ name (or "all")
        #[arg(long)]
        organ: String,

        /// Output predictions file (.tsv.gz)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Run every stage for one or more organs
    Run {
        #[command(flatten)]
        generic: GenericArgs,

        #[command(flatten)]
        organ_args: OrganArgs,

        #[command(flatten)]
        models: ModelArgs,

        /// Annotation JSON Lines file
        #[arg(long, env = "REGULOME_ANNOTATIONS")]
        annotations: PathBuf,

        /// Organs to score (repeatable)
        #[arg(long = "organ", required = true)]
        organs: Vec<String>,

        /// Output directory
        #[arg(long, default_value = "results")]
        out_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GenericArgs {
    /// Variant registry (TSV, optionally gzipped)
    #[arg(long, env = "REGULOME_VARIANTS")]
    variants: PathBuf,

    /// Sequence-class score table (TSV with header)
    #[arg(long, env = "REGULOME_SEQUENCE_CLASSES")]
    sequence_classes: PathBuf,

    /// Directory with the generic DNase bigWig tracks
    #[arg(long, env = "REGULOME_DNASE_DIR")]
    dnase_dir: PathBuf,

    /// Directory with the generic ChIP bigWig tracks
    #[arg(long, env = "REGULOME_CHIP_DIR")]
    chip_dir: PathBuf,

    /// Handling of a class-score column with no values in the run
    #[arg(long, value_enum, default_value_t = AllNullPolicy::Fail)]
    all_null_class_policy: AllNullPolicy,
}

impl From<GenericArgs> for GenericInputs {
    fn from(args: GenericArgs) -> Self {
        Self {
            variants: args.variants,
            sequence_classes: args.sequence_classes,
            dnase_dir: args.dnase_dir,
            chip_dir: args.chip_dir,
            all_null_policy: args.all_null_class_policy,
        }
    }
}

#[derive(Args, Debug)]
struct OrganArgs {
    /// Directory with `<feature>_<organ>.bw` tracks
    #[arg(long, env = "REGULOME_ORGAN_DNASE_DIR")]
    organ_dnase_dir: PathBuf,

    /// Directory with `<FAMILY>_totalNum_organ_hg38.txt` files
    #[arg(long, env = "REGULOME_TOTALS_DIR")]
    totals_dir: PathBuf,

    /// Join used to combine the organ count tables
    #[arg(long, value_enum, default_value_t = JoinKind::Inner)]
    organ_join: JoinKind,
}

impl From<OrganArgs> for OrganInputs {
    fn from(args: OrganArgs) -> Self {
        Self {
            organ_dnase_dir: args.organ_dnase_dir,
            totals_dir: args.totals_dir,
            join_kind: args.organ_join,
        }
    }
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Organs the models can score, one per line
    #[arg(long, env = "REGULOME_ORGAN_LIST")]
    organ_list: PathBuf,

    /// Directory with model_full.json and model_lightest.json
    #[arg(long, env = "REGULOME_MODELS_DIR")]
    models_dir: PathBuf,

    /// Replace the built-in list of organs scored by the full model
    #[arg(long)]
    data_rich_organs: Option<PathBuf>,
}

impl From<ModelArgs> for ModelInputs {
    fn from(args: ModelArgs) -> Self {
        Self {
            organ_list: args.organ_list,
            models_dir: args.models_dir,
            data_rich_organs: args.data_rich_organs,
        }
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regulome_scorer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(err) = execute(cli.command) {
        match err.downcast_ref::<DispatchError>() {
            Some(invalid) => eprintln!("Error: {}", invalid),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

fn execute(command: Command) -> Result<()> {
    let pipeline: FeaturePipeline = FeaturePipeline::default();

    match command {
        Command::Generic {
            generic,
            annotations,
            out,
        } => {
            let records = processor::read_annotations(&annotations)?;
            let matrix = pipeline.generic_features(&records, &generic.into())?;
            output::write_feature_matrix(&out, &matrix)?;
        }

        Command::Organ {
            organ_args,
            annotations,
            organ,
            out,
        } => {
            let inputs: OrganInputs = organ_args.into();
            let records = processor::read_annotations(&annotations)?;
            let totals = OrganTotals::load(&inputs.totals_dir)
                .with_context(|| format!("Failed to load organ totals from {:?}", inputs.totals_dir))?;
            let table = pipeline.organ_features(&organ, &records, &totals, &inputs)?;
            output::write_keyed_table(&out, &table, Some(organ.as_str()))?;
        }

        Command::Predict {
            models,
            generic_features,
            organ_features,
            organ,
            out,
        } => {
            let models: ModelInputs = models.into();
            processor::check_organs(std::slice::from_ref(&organ), &models)?;

            info!("Predicting scores for {}...", organ);
            let predictor = processor::load_predictor(&models)?;
            let generic = output::read_feature_matrix(&generic_features)?;
            let organ_table = output::read_keyed_table(&organ_features)?;
            let predictions = processor::predict(&organ, generic, organ_table, &predictor)?;
            output::write_predictions(&out, &predictions)?;
        }

        Command::Run {
            generic,
            organ_args,
            models,
            annotations,
            organs,
            out_dir,
        } => {
            let config = PipelineConfig {
                annotations,
                generic: generic.into(),
                organ: organ_args.into(),
                models: models.into(),
            };
            let outputs = pipeline.run(&config, &organs, &OutputLayout::new(out_dir))?;
            for path in outputs {
                info!("Predictions written to {:?}", path);
            }
        }
    }

    Ok(())
}
