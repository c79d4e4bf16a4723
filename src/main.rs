//! amr-align CLI: greedy graph-to-text alignment.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use amr_align::align::{AlignmentTask, ReentrancyAligner, RelationAligner, SubgraphAligner, coverage};
use amr_align::alignment::AlignmentCollection;
use amr_align::config::AlignConfig;
use amr_align::corpus::Corpus;
use amr_align::train::{Trainer, TrainingReport, run_pipeline};

#[derive(Parser)]
#[command(name = "amr-align", version, about = "Align semantic graphs to sentence token spans")]
struct Cli {
    /// TOML configuration file; defaults apply to missing keys.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align graph nodes to spans.
    Subgraphs {
        /// Preprocessed corpus (JSON).
        #[arg(long)]
        corpus: PathBuf,

        /// Where to write the alignments.
        #[arg(long)]
        output: PathBuf,

        /// Number of epochs, overriding the config.
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Align graph edges to spans, given subgraph alignments.
    Relations {
        #[arg(long)]
        corpus: PathBuf,

        /// Subgraph alignments (JSON).
        #[arg(long)]
        subgraphs: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Explain reentrant edges, given subgraph and relation alignments.
    Reentrancies {
        #[arg(long)]
        corpus: PathBuf,

        #[arg(long)]
        subgraphs: PathBuf,

        /// Relation alignments (JSON).
        #[arg(long)]
        relations: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Run all three stages, writing one file per stage.
    Pipeline {
        #[arg(long)]
        corpus: PathBuf,

        /// Directory for subgraphs.json, relations.json and reentrancies.json.
        #[arg(long)]
        output_dir: PathBuf,

        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Report how many items an alignment file covers.
    Coverage {
        #[arg(long)]
        corpus: PathBuf,

        /// Alignments to measure (JSON).
        #[arg(long)]
        alignments: PathBuf,

        #[arg(long, value_enum)]
        task: TaskKind,

        /// Subgraph alignments; relation coverage excludes edges internal
        /// to a subgraph record.
        #[arg(long)]
        subgraphs: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TaskKind {
    Subgraphs,
    Relations,
    Reentrancies,
}

fn load_config(path: Option<&Path>, epochs: Option<usize>) -> Result<AlignConfig> {
    let mut config = match path {
        Some(path) => AlignConfig::load(path)?,
        None => AlignConfig::default(),
    };
    if let Some(epochs) = epochs {
        config.num_epochs = epochs;
    }
    config.validate()?;
    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .into_diagnostic()?;
    }
    Ok(config)
}

fn print_report(report: &TrainingReport) {
    println!("{}:", report.task);
    for epoch in &report.epochs {
        println!("  {epoch}");
    }
    if report.stopped_early {
        println!("  stopped early on perplexity increase");
    }
}

fn train_and_save<T: AlignmentTask>(
    mut task: T,
    config: &AlignConfig,
    corpus: &Corpus,
    output: &Path,
) -> Result<()> {
    let (alignments, report) = Trainer::new(config).train(&mut task, corpus)?;
    alignments.save(output, corpus)?;
    print_report(&report);
    println!("Wrote {} records to {}", alignments.record_count(), output.display());
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Subgraphs {
            corpus,
            output,
            epochs,
        } => {
            let config = load_config(config_path, epochs)?;
            let corpus = Corpus::load(&corpus)?;
            let task = SubgraphAligner::new(config.clone(), &corpus);
            train_and_save(task, &config, &corpus, &output)?;
        }

        Commands::Relations {
            corpus,
            subgraphs,
            output,
            epochs,
        } => {
            let config = load_config(config_path, epochs)?;
            let corpus = Corpus::load(&corpus)?;
            let subgraphs = AlignmentCollection::load(&subgraphs, &corpus)?;
            let task = RelationAligner::new(config.clone(), &corpus, subgraphs);
            train_and_save(task, &config, &corpus, &output)?;
        }

        Commands::Reentrancies {
            corpus,
            subgraphs,
            relations,
            output,
            epochs,
        } => {
            let config = load_config(config_path, epochs)?;
            let corpus = Corpus::load(&corpus)?;
            let subgraphs = AlignmentCollection::load(&subgraphs, &corpus)?;
            let relations = AlignmentCollection::load(&relations, &corpus)?;
            let task = ReentrancyAligner::new(config.clone(), subgraphs, relations);
            train_and_save(task, &config, &corpus, &output)?;
        }

        Commands::Pipeline {
            corpus,
            output_dir,
            epochs,
        } => {
            let config = load_config(config_path, epochs)?;
            let corpus = Corpus::load(&corpus)?;
            std::fs::create_dir_all(&output_dir).into_diagnostic()?;
            let output = run_pipeline(&config, &corpus)?;
            for (name, alignments) in [
                ("subgraphs.json", &output.subgraphs),
                ("relations.json", &output.relations),
                ("reentrancies.json", &output.reentrancies),
            ] {
                alignments.save(&output_dir.join(name), &corpus)?;
            }
            for report in &output.reports {
                print_report(report);
            }
            println!("Wrote alignments to {}", output_dir.display());
        }

        Commands::Coverage {
            corpus,
            alignments,
            task,
            subgraphs,
        } => {
            let config = load_config(config_path, None)?;
            let corpus = Corpus::load(&corpus)?;
            let alignments = AlignmentCollection::load(&alignments, &corpus)?;
            let subgraphs = match subgraphs {
                Some(path) => AlignmentCollection::load(&path, &corpus)?,
                None => AlignmentCollection::new(),
            };
            let covered = match task {
                TaskKind::Subgraphs => coverage(&SubgraphAligner::new(config, &corpus), &corpus, &alignments),
                TaskKind::Relations => coverage(
                    &RelationAligner::new(config, &corpus, subgraphs),
                    &corpus,
                    &alignments,
                ),
                TaskKind::Reentrancies => coverage(
                    &ReentrancyAligner::new(config, subgraphs, AlignmentCollection::new()),
                    &corpus,
                    &alignments,
                ),
            };
            println!("{task:?} coverage: {covered}");
        }

        Commands::Config => {
            let config = load_config(config_path, None)?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
