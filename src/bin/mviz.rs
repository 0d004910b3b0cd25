//! mviz - Microbiome visualization analytics CLI
//!
//! Command-line access to the analysis flows behind the dashboard:
//! per-study and cross-study beta diversity, merged-table ordination,
//! and graph enrichment/export.

use clap::{Parser, Subcommand, ValueEnum};
use microviz::config::DashboardConfig;
use microviz::data::{load_study_table, pool_tables, SampleMetadata, StudyAssignments, StudyCatalog, TaxonomicRank};
use microviz::diversity::{
    beta_diversity_all_biomes, beta_diversity_comparison, beta_diversity_single_biome,
    beta_diversity_study, BetaDiversity,
};
use microviz::error::{MicrovizError, Result};
use microviz::graph::{
    read_graphml, style_association_network, style_knowledge_subgraph, write_cytoscape_json,
    write_edge_list, write_graphml, Network, SizeRange,
};
use microviz::ordination::{pcoa, OrdinationFrame};
use std::path::PathBuf;

/// Which configured graph to load
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliGraphKind {
    /// Microbial association network for a biome/experiment pair
    Association,
    /// Knowledge-graph subgraph for a biome/experiment pair
    Knowledge,
    /// The complete knowledge graph
    Complete,
}

/// Export format for enriched graphs
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliExportFormat {
    /// GraphML with derived attributes as declared keys
    Graphml,
    /// CSV edge list
    Edges,
    /// Cytoscape JSON
    Json,
}

/// Microbiome dashboard analytics
#[derive(Parser)]
#[command(name = "mviz")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Beta diversity and ordination for a single study
    Study {
        /// Directory holding per-study abundance tables
        #[arg(short, long)]
        dir: PathBuf,

        /// Study accession (e.g., MGYS00001234)
        #[arg(short, long)]
        study: String,

        /// Taxonomic rank: phylum, genus, or species
        #[arg(short, long, default_value = "genus")]
        rank: String,

        /// Path to the study's sample metadata CSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output path for the distance matrix CSV
        #[arg(long)]
        matrix: Option<PathBuf>,

        /// Output path for the PCoA embedding CSV
        #[arg(short, long)]
        embedding: Option<PathBuf>,

        /// Print the N most abundant taxa as relative abundances
        #[arg(long)]
        top: Option<usize>,
    },

    /// Beta diversity and ordination across pooled studies
    Compare {
        /// Directory holding per-study abundance tables
        #[arg(short, long)]
        dir: PathBuf,

        /// Study accessions (comma-separated)
        #[arg(short, long)]
        studies: String,

        /// Taxonomic rank: phylum, genus, or species
        #[arg(short, long, default_value = "genus")]
        rank: String,

        /// Output path for the distance matrix CSV
        #[arg(long)]
        matrix: Option<PathBuf>,

        /// Output path for the PCoA embedding CSV
        #[arg(short, long)]
        embedding: Option<PathBuf>,
    },

    /// Ordination over merged tables, all biomes or one biome
    Ordinate {
        /// Path to the dashboard configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Restrict to one biome (all biomes when omitted)
        #[arg(short, long)]
        biome: Option<String>,

        /// Output path for the distance matrix CSV
        #[arg(long)]
        matrix: Option<PathBuf>,

        /// Output path for the annotated embedding CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Enrich a configured graph and export it
    Enrich {
        /// Path to the dashboard configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Which configured graph to load
        #[arg(short, long, value_enum)]
        kind: CliGraphKind,

        /// Biome name (required for association and knowledge graphs)
        #[arg(short, long)]
        biome: Option<String>,

        /// Experiment type (required for association and knowledge graphs)
        #[arg(short = 'x', long)]
        experiment: Option<String>,

        /// Minimum node size, overriding the per-kind default
        #[arg(long)]
        min_size: Option<f64>,

        /// Maximum node size, overriding the per-kind default
        #[arg(long)]
        max_size: Option<f64>,

        /// Export format
        #[arg(short, long, value_enum, default_value = "graphml")]
        format: CliExportFormat,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Study {
            dir,
            study,
            rank,
            metadata,
            matrix,
            embedding,
            top,
        } => cmd_study(
            &dir,
            &study,
            &rank,
            &metadata,
            matrix.as_ref(),
            embedding.as_ref(),
            top,
        ),

        Commands::Compare {
            dir,
            studies,
            rank,
            matrix,
            embedding,
        } => cmd_compare(&dir, &studies, &rank, matrix.as_ref(), embedding.as_ref()),

        Commands::Ordinate {
            config,
            biome,
            matrix,
            output,
        } => cmd_ordinate(&config, biome.as_deref(), matrix.as_ref(), &output),

        Commands::Enrich {
            config,
            kind,
            biome,
            experiment,
            min_size,
            max_size,
            format,
            output,
        } => cmd_enrich(
            &config,
            kind,
            biome.as_deref(),
            experiment.as_deref(),
            min_size,
            max_size,
            format,
            &output,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Per-study beta diversity and embedding
fn cmd_study(
    dir: &PathBuf,
    study: &str,
    rank_str: &str,
    metadata_path: &PathBuf,
    matrix_out: Option<&PathBuf>,
    embedding_out: Option<&PathBuf>,
    top: Option<usize>,
) -> Result<()> {
    let rank: TaxonomicRank = rank_str.parse()?;
    eprintln!("Loading {} table for {}...", rank, study);
    let table = load_study_table(dir, study, rank)?;
    eprintln!(
        "Loaded {} taxa x {} samples",
        table.n_taxa(),
        table.n_samples()
    );

    if let Some(n) = top {
        println!("Top {} taxa by relative abundance:", n);
        for entry in table.relative_top_taxa(n) {
            println!("  {}: {:.2}%", entry.taxon, entry.total);
        }
    }

    eprintln!("Loading sample metadata...");
    let metadata = SampleMetadata::from_csv(metadata_path)?;

    eprintln!("Computing Bray-Curtis dissimilarities...");
    let beta = beta_diversity_study(&table, &metadata)?;
    write_study_outputs(&beta, matrix_out, embedding_out)
}

/// Pooled cross-study beta diversity and embedding
fn cmd_compare(
    dir: &PathBuf,
    studies_str: &str,
    rank_str: &str,
    matrix_out: Option<&PathBuf>,
    embedding_out: Option<&PathBuf>,
) -> Result<()> {
    let rank: TaxonomicRank = rank_str.parse()?;
    let studies: Vec<&str> = studies_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if studies.len() < 2 {
        return Err(MicrovizError::InvalidParameter(
            "comparison needs at least two studies".to_string(),
        ));
    }

    eprintln!("Loading {} tables at {} rank...", studies.len(), rank);
    let mut tables = Vec::with_capacity(studies.len());
    for study in &studies {
        tables.push(load_study_table(dir, study, rank)?);
    }
    let pairs: Vec<(&str, &microviz::data::AbundanceTable)> = studies
        .iter()
        .zip(tables.iter())
        .map(|(study, table)| (*study, table))
        .collect();
    let pooled = pool_tables(&pairs)?;
    eprintln!(
        "Pooled {} samples over {} taxa",
        pooled.n_samples(),
        pooled.n_taxa()
    );

    eprintln!("Computing Bray-Curtis dissimilarities...");
    let matrix = beta_diversity_comparison(&pooled)?;
    if let Some(path) = matrix_out {
        matrix.to_csv(path)?;
        eprintln!("Wrote distance matrix to {:?}", path);
    }
    if let Some(path) = embedding_out {
        let embedding = pcoa(&matrix)?;
        report_variance(&embedding.proportion_explained);
        let frame = OrdinationFrame::study_comparison(&embedding, &pooled)?;
        frame.to_csv(path)?;
        eprintln!("Wrote embedding to {:?}", path);
    }
    Ok(())
}

/// Merged-table ordination, all biomes or one biome
fn cmd_ordinate(
    config_path: &PathBuf,
    biome: Option<&str>,
    matrix_out: Option<&PathBuf>,
    output: &PathBuf,
) -> Result<()> {
    eprintln!("Loading configuration from {:?}...", config_path);
    let config = DashboardConfig::from_file(config_path)?;
    let studies_file = config.studies_file.as_ref().ok_or_else(|| {
        MicrovizError::InvalidParameter("no studies file configured".to_string())
    })?;
    let catalog = StudyCatalog::from_csv(studies_file, &config.catalog)?;

    let (beta, assignments, single_biome) = match biome {
        None => {
            let files = config.merged_files_allbiomes.as_ref().ok_or_else(|| {
                MicrovizError::InvalidParameter("no all-biomes files configured".to_string())
            })?;
            eprintln!("Loading merged all-biomes table...");
            let table = microviz::data::AbundanceTable::from_csv(&files.abundance)?;
            let metadata = SampleMetadata::from_csv(&files.samples)?;
            let assignments = StudyAssignments::from_csv(&files.study_ids)?;
            eprintln!(
                "Loaded {} taxa x {} samples",
                table.n_taxa(),
                table.n_samples()
            );
            eprintln!("Computing Bray-Curtis dissimilarities...");
            (beta_diversity_all_biomes(&table, &metadata)?, assignments, false)
        }
        Some(name) => {
            let files = config.merged_files_per_biome.get(name).ok_or_else(|| {
                MicrovizError::InvalidParameter(format!(
                    "no merged files configured for biome '{}'",
                    name
                ))
            })?;
            let samples = files.samples.as_ref().ok_or_else(|| {
                MicrovizError::InvalidParameter(format!(
                    "no samples file configured for biome '{}'",
                    name
                ))
            })?;
            let study_ids = files.study_ids.as_ref().ok_or_else(|| {
                MicrovizError::InvalidParameter(format!(
                    "no study assignment file configured for biome '{}'",
                    name
                ))
            })?;
            eprintln!("Loading merged table for biome '{}'...", name);
            let table = microviz::data::AbundanceTable::from_csv(&files.abundance)?;
            let metadata = SampleMetadata::from_csv(samples)?;
            let assignments = StudyAssignments::from_csv(study_ids)?;
            eprintln!(
                "Loaded {} taxa x {} samples",
                table.n_taxa(),
                table.n_samples()
            );
            eprintln!("Computing Bray-Curtis dissimilarities...");
            (beta_diversity_single_biome(&table, &metadata)?, assignments, true)
        }
    };

    if let Some(path) = matrix_out {
        beta.matrix.to_csv(path)?;
        eprintln!("Wrote distance matrix to {:?}", path);
    }

    let embedding = pcoa(&beta.matrix)?;
    report_variance(&embedding.proportion_explained);
    let frame = if single_biome {
        OrdinationFrame::single_biome(&embedding, &beta.samples, &assignments, &catalog)?
    } else {
        OrdinationFrame::all_biomes(&embedding, &beta.samples, &assignments, &catalog)?
    };
    frame.to_csv(output)?;
    eprintln!("Wrote embedding to {:?}", output);
    Ok(())
}

/// Load, style and export one configured graph
#[allow(clippy::too_many_arguments)]
fn cmd_enrich(
    config_path: &PathBuf,
    kind: CliGraphKind,
    biome: Option<&str>,
    experiment: Option<&str>,
    min_size: Option<f64>,
    max_size: Option<f64>,
    format: CliExportFormat,
    output: &PathBuf,
) -> Result<()> {
    eprintln!("Loading configuration from {:?}...", config_path);
    let config = DashboardConfig::from_file(config_path)?;

    let graph_path = match kind {
        CliGraphKind::Association => {
            let (biome, experiment) = require_pair(biome, experiment)?;
            config.association_network_path(biome, experiment)?
        }
        CliGraphKind::Knowledge => {
            let (biome, experiment) = require_pair(biome, experiment)?;
            config.knowledge_subgraph_path(biome, experiment)?
        }
        CliGraphKind::Complete => config.complete_kg_path()?,
    };

    eprintln!("Loading {:?}...", graph_path);
    let mut network = read_graphml(&graph_path)?;
    eprintln!(
        "Loaded {} nodes, {} edges",
        network.n_nodes(),
        network.n_edges()
    );

    let default_sizes = match kind {
        CliGraphKind::Association => SizeRange::ASSOCIATION,
        CliGraphKind::Knowledge | CliGraphKind::Complete => SizeRange::KNOWLEDGE,
    };
    let sizes = match (min_size, max_size) {
        (None, None) => default_sizes,
        (min, max) => SizeRange::new(
            min.unwrap_or_else(|| default_sizes.min()),
            max.unwrap_or_else(|| default_sizes.max()),
        )?,
    };

    match kind {
        CliGraphKind::Association => style_association_network(&mut network, sizes),
        CliGraphKind::Knowledge | CliGraphKind::Complete => {
            style_knowledge_subgraph(&mut network, sizes, &config.kg_nodes, &config.kg_edges)
        }
    }

    export(&network, format, output)?;
    eprintln!("Wrote {:?}", output);
    Ok(())
}

fn write_study_outputs(
    beta: &BetaDiversity,
    matrix_out: Option<&PathBuf>,
    embedding_out: Option<&PathBuf>,
) -> Result<()> {
    if let Some(path) = matrix_out {
        beta.matrix.to_csv(path)?;
        eprintln!("Wrote distance matrix to {:?}", path);
    }
    if let Some(path) = embedding_out {
        let embedding = pcoa(&beta.matrix)?;
        report_variance(&embedding.proportion_explained);
        let frame = OrdinationFrame::single_study(&embedding, &beta.samples)?;
        frame.to_csv(path)?;
        eprintln!("Wrote embedding to {:?}", path);
    }
    Ok(())
}

fn report_variance(proportions: &[f64; 2]) {
    eprintln!(
        "PC1 {:.1}%, PC2 {:.1}% of retained variance",
        proportions[0] * 100.0,
        proportions[1] * 100.0
    );
}

fn require_pair<'a>(
    biome: Option<&'a str>,
    experiment: Option<&'a str>,
) -> Result<(&'a str, &'a str)> {
    match (biome, experiment) {
        (Some(b), Some(e)) => Ok((b, e)),
        _ => Err(MicrovizError::InvalidParameter(
            "this graph kind needs both --biome and --experiment".to_string(),
        )),
    }
}

fn export(network: &Network, format: CliExportFormat, output: &PathBuf) -> Result<()> {
    match format {
        CliExportFormat::Graphml => write_graphml(network, output),
        CliExportFormat::Edges => write_edge_list(network, output),
        CliExportFormat::Json => write_cytoscape_json(network, output),
    }
}
