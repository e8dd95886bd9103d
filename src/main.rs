use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use std::fs;
use std::path::PathBuf;

use reftool::bibtex::BibEntry;
use reftool::citekey::{self, CitekeyRequest};
use reftool::config::{compress_user, Settings};
use reftool::organizer::{render_entries, ArticleInfo, ExportSort, FileMode};
use reftool::pipeline::{BatchReport, Destination, OutputFormat, Pipeline};
use reftool::registry::{registry_for, RegistryKind};
use reftool::search::SearchQuery;
use reftool::sync::apply_sync;

/// Tools for keeping a personal library of papers: citekeys, BibTeX/RIS
/// normalization, registry lookups and filing of article PDFs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to $REFTOOL_CONFIG or ~/.config/reftool/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate citekeys from author and year, or from DOIs
    Citekey(CitekeyArgs),
    /// Normalize BibTeX files and regenerate their citekeys
    Format(ConvertArgs),
    /// Convert RIS files to BibTeX
    Ris(ConvertArgs),
    /// Build entries from registry metadata
    Fetch(FetchArgs),
    /// Copy or move an article into the library tree
    File(FileArgs),
    /// Merge the library's .bib files into one sorted bibliography
    Export(ExportArgs),
    /// Find library entries by author, year, journal, keyword or DOI
    Search(SearchArgs),
    /// Copy new and updated library files to or from another directory
    Sync(SyncArgs),
}

#[derive(Args)]
struct CitekeyArgs {
    /// First-author surname (repeat together with --year)
    #[arg(short, long)]
    author: Vec<String>,
    /// Publication year
    #[arg(short, long)]
    year: Vec<String>,
    /// DOI of each publication, reusing its key if already present
    #[arg(long)]
    doi: Vec<String>,
    /// Look the author and year up by DOI instead
    #[arg(long, num_args = 1.., conflicts_with_all = ["author", "year", "doi"])]
    from_doi: Vec<String>,
    /// Bibliography whose keys are avoided
    #[arg(short, long)]
    bib: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = RegistryArg::Crossref)]
    registry: RegistryArg,
}

#[derive(Args)]
struct OutputArgs {
    /// Write entries into the library tree instead of stdout
    #[arg(short = 'O', long)]
    output: bool,
    /// Output format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Bibtex)]
    format: FormatArg,
    /// Bibliography whose keys are avoided
    #[arg(short, long)]
    bib: Option<PathBuf>,
    /// Add the entries to the --bib bibliography
    #[arg(long, requires = "bib")]
    append: bool,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input files
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Remove each input file after it was converted
    #[arg(short = 'C', long)]
    cleanup: bool,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct FetchArgs {
    /// DOIs to look up
    #[arg(required = true)]
    dois: Vec<String>,
    #[arg(long, value_enum, default_value_t = RegistryArg::Crossref)]
    registry: RegistryArg,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct FileArgs {
    /// Article file to file into the library
    file: PathBuf,
    /// Take author, year, journal and volume from the registry record
    #[arg(long, conflicts_with_all = ["author", "year", "journal"])]
    doi: Option<String>,
    /// Lead author of the publication
    #[arg(short = 'A', long, required_unless_present = "doi")]
    author: Option<String>,
    /// Publication year
    #[arg(short = 'Y', long, required_unless_present = "doi")]
    year: Option<String>,
    /// Publication journal
    #[arg(short = 'J', long, required_unless_present = "doi")]
    journal: Option<String>,
    /// Journal volume
    #[arg(short = 'V', long)]
    volume: Option<String>,
    /// Journal number
    #[arg(short = 'N', long)]
    number: Option<String>,
    /// File is an article supplement
    #[arg(short = 'S', long)]
    supplement: bool,
    /// Remove the source file after filing
    #[arg(short = 'M', long = "move")]
    move_file: bool,
    #[arg(long, value_enum, default_value_t = RegistryArg::Crossref)]
    registry: RegistryArg,
}

#[derive(Args)]
struct ExportArgs {
    /// Sort order of the exported entries
    #[arg(short, long, value_enum, default_value_t = SortArg::Key)]
    sort: SortArg,
    /// Output file (prints to stdout if not specified)
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    /// Author regular expressions
    #[arg(short = 'A', long)]
    author: Vec<String>,
    /// Match --author against the first author only
    #[arg(short = 'F', long)]
    first: bool,
    /// Year regular expressions
    #[arg(short = 'Y', long)]
    year: Vec<String>,
    /// Journal regular expressions
    #[arg(short = 'J', long)]
    journal: Vec<String>,
    /// Regular expressions for titles and keywords
    #[arg(short = 'K', long)]
    keyword: Vec<String>,
    /// DOIs to find
    #[arg(long)]
    doi: Vec<String>,
    /// Print matches in reverse library order
    #[arg(short, long)]
    reverse: bool,
    /// Also write the matches to one bibliography file
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[derive(Args)]
struct SyncArgs {
    /// Directory to sync with, relative to the library root
    directory: PathBuf,
    /// Copy from the directory into the library
    #[arg(short = 'P', long)]
    pull: bool,
    /// Copy every file, even when the target is not older
    #[arg(short = 'C', long)]
    clobber: bool,
    /// Only list the files that would be copied
    #[arg(short = 'L', long)]
    list: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Bibtex,
    Ris,
}

#[derive(Clone, Copy, ValueEnum)]
enum RegistryArg {
    Crossref,
    Datacite,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Key,
    Year,
    Type,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Bibtex => OutputFormat::Bibtex,
            FormatArg::Ris => OutputFormat::Ris,
        }
    }
}

impl From<RegistryArg> for RegistryKind {
    fn from(arg: RegistryArg) -> Self {
        match arg {
            RegistryArg::Crossref => RegistryKind::Crossref,
            RegistryArg::Datacite => RegistryKind::DataCite,
        }
    }
}

impl From<SortArg> for ExportSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Key => ExportSort::Key,
            SortArg::Year => ExportSort::Year,
            SortArg::Type => ExportSort::Type,
        }
    }
}

impl OutputArgs {
    fn destination(&self) -> Destination {
        Destination {
            format: self.format.into(),
            library: self.output,
            bib: self.bib.clone(),
            append: self.append,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let pipeline = Pipeline::new(settings)?;

    match cli.command {
        Command::Citekey(args) => run_citekey(&pipeline, args),
        Command::Format(args) => run_convert(&pipeline, args, Pipeline::format_bibtex),
        Command::Ris(args) => run_convert(&pipeline, args, Pipeline::convert_ris),
        Command::Fetch(args) => run_fetch(&pipeline, args),
        Command::File(args) => run_file(&pipeline, args),
        Command::Export(args) => run_export(&pipeline, args),
        Command::Search(args) => run_search(&pipeline, args),
        Command::Sync(args) => run_sync(&pipeline, args),
    }
}

fn run_citekey(pipeline: &Pipeline, args: CitekeyArgs) -> Result<()> {
    let destination = Destination {
        bib: args.bib.clone(),
        ..Destination::default()
    };
    let mut existing = pipeline.existing_keys(&destination)?;
    let mut report = BatchReport::default();

    if !args.from_doi.is_empty() {
        let registry = registry_for(args.registry.into(), &pipeline.settings().registry)?;
        for doi in &args.from_doi {
            let result = pipeline.fetch_entry(registry.as_ref(), doi, &mut existing);
            if let Some(entry) = report.record(doi, result) {
                println!("{}", entry.key);
            }
        }
        return report.finish();
    }

    if args.author.is_empty() {
        bail!("Give --author and --year, or --from-doi");
    }
    if args.author.len() != args.year.len() {
        bail!("Each --author needs a matching --year");
    }
    if !args.doi.is_empty() && args.doi.len() != args.author.len() {
        bail!("Give either no --doi or one per --author");
    }
    for (i, (author, year)) in args.author.iter().zip(&args.year).enumerate() {
        let doi = args.doi.get(i).map(String::as_str);
        let request = CitekeyRequest::new(author, year).with_doi(doi);
        let result = citekey::generate(&request, &existing).map_err(anyhow::Error::from);
        if let Some(key) = report.record(&format!("{author} {year}"), result) {
            existing.insert(key.clone(), doi);
            println!("{key}");
        }
    }
    report.finish()
}

fn run_convert<F>(pipeline: &Pipeline, args: ConvertArgs, convert: F) -> Result<()>
where
    F: Fn(&Pipeline, &str, &mut reftool::ExistingKeys) -> Result<Vec<BibEntry>>,
{
    let destination = args.output.destination();
    let mut existing = pipeline.existing_keys(&destination)?;
    let mut report = BatchReport::default();
    for file in &args.files {
        info!("Processing {}", file.display());
        let result = pipeline.process_file(file, &destination, &mut existing, args.cleanup, &convert);
        report.record(&file.display().to_string(), result);
    }
    report.finish()
}

fn run_fetch(pipeline: &Pipeline, args: FetchArgs) -> Result<()> {
    let destination = args.output.destination();
    let registry = registry_for(args.registry.into(), &pipeline.settings().registry)?;
    let mut existing = pipeline.existing_keys(&destination)?;
    let mut report = BatchReport::default();
    for doi in &args.dois {
        let result = pipeline
            .fetch_entry(registry.as_ref(), doi, &mut existing)
            .and_then(|entry| pipeline.write_entries(std::slice::from_ref(&entry), &destination));
        report.record(doi, result);
    }
    report.finish()
}

fn run_file(pipeline: &Pipeline, args: FileArgs) -> Result<()> {
    let mut article = match &args.doi {
        Some(doi) => {
            let registry = registry_for(args.registry.into(), &pipeline.settings().registry)?;
            pipeline.article_from_doi(registry.as_ref(), doi)?
        }
        None => ArticleInfo {
            author: args.author.clone().unwrap_or_default(),
            year: args.year.clone().unwrap_or_default(),
            journal: args.journal.clone().unwrap_or_default(),
            ..ArticleInfo::default()
        },
    };
    if let Some(volume) = args.volume {
        article.volume = volume;
    }
    if let Some(number) = args.number {
        article.number = number;
    }
    article.supplement = args.supplement;

    let mode = if args.move_file { FileMode::Move } else { FileMode::Copy };
    let target = pipeline.file_article(&args.file, &article, mode)?;
    println!("{}", compress_user(&target).display());
    Ok(())
}

fn run_export(pipeline: &Pipeline, args: ExportArgs) -> Result<()> {
    let (output, library) = pipeline.export(args.sort.into())?;
    if let Some(path) = &args.export {
        fs::write(path, &output).with_context(|| format!("Failed to write output to {:?}", path))?;
        info!("Exported {} entries to {:?}", library.entries.len(), path);
    } else {
        print!("{output}");
    }
    if !library.failures.is_empty() {
        bail!("{} library files could not be read", library.failures.len());
    }
    Ok(())
}

fn run_search(pipeline: &Pipeline, args: SearchArgs) -> Result<()> {
    let query = SearchQuery {
        authors: args.author,
        first_author_only: args.first,
        years: args.year,
        journals: args.journal,
        keywords: args.keyword,
        dois: args.doi,
    };
    let (found, queried) = pipeline.search(&query, args.reverse)?;
    for item in &found {
        println!("{}", item.entry);
    }
    info!("Matching references = {} out of {} queried", found.len(), queried);

    if let Some(path) = &args.export {
        let entries: Vec<_> = found.iter().collect();
        fs::write(path, render_entries(&entries))
            .with_context(|| format!("Failed to write output to {:?}", path))?;
        info!("Exported {} entries to {:?}", found.len(), path);
    }
    Ok(())
}

fn run_sync(pipeline: &Pipeline, args: SyncArgs) -> Result<()> {
    let actions = pipeline.plan_sync(&args.directory, args.pull, args.clobber)?;
    if args.list {
        for action in &actions {
            println!("{action}");
        }
        return Ok(());
    }
    apply_sync(&actions)?;
    info!("Copied {} files", actions.len());
    Ok(())
}
