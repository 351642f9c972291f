use std::path::{Path, PathBuf};

use colored::Colorize;
use futures::future::join_all;
use redline::flow::DEFAULT_FLOW_DPI;
use redline::parser::table::AlignmentTableDetector;
use redline::pipeline::DEFAULT_DPI;
use redline::raster::PdfiumRasterizer;
use redline::{ExtractOptions, ExtractionReport, FlagRule};

use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args, Clone)]
pub struct App {
    /// Source PDF files
    #[arg(required = true, value_name = "PDF")]
    pub paths: Vec<PathBuf>,

    /// Resolution every region is rasterized at
    #[arg(long, env = "REDLINE_DPI", default_value_t = DEFAULT_DPI)]
    pub dpi: f32,

    /// Which span colours count as flagged: threshold or exact
    #[arg(long, env = "REDLINE_FLAG_RULE", default_value_t = FlagRule::Threshold)]
    pub flag_rule: FlagRule,

    /// Points per inch used to size rasters in the DOCX output
    #[arg(long, env = "REDLINE_FLOW_DPI", default_value_t = DEFAULT_FLOW_DPI)]
    pub flow_dpi: f32,

    /// Directory the outputs are written to
    #[arg(short, long, env = "REDLINE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Do not emit black catalogue titles
    #[arg(long)]
    pub no_catalogue_titles: bool,

    /// Rewrite the composited PDF after every page
    #[arg(long)]
    pub checkpoint: bool,

    /// Output the reports as JSON
    #[arg(long)]
    pub json: bool,
}

impl App {
    fn options(&self) -> ExtractOptions {
        ExtractOptions {
            dpi: self.dpi,
            flag_rule: self.flag_rule,
            flow_dpi: self.flow_dpi,
            catalogue_titles: !self.no_catalogue_titles,
            ..Default::default()
        }
    }
}

/// What one source file produced.
#[derive(Debug, serde::Serialize)]
pub struct Outcome {
    pub source: PathBuf,
    pub composited: PathBuf,
    pub flowing: PathBuf,
    pub report: ExtractionReport,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    std::fs::create_dir_all(&app.output_dir)
        .wrap_err_with(|| f!("creating {}", app.output_dir.display()))?;

    let options = app.options();
    if global.verbose {
        println!(
            "dpi {} / flag rule {} / flow dpi {} -> {}",
            options.dpi,
            options.flag_rule,
            options.flow_dpi,
            app.output_dir.display()
        );
    }

    let spinner = new_spinner(f!("Extracting {} file(s)...", app.paths.len()))?;

    // Every file gets its own worker and its own state.
    let tasks = app.paths.iter().cloned().map(|path| {
        let options = options.clone();
        let output_dir = app.output_dir.clone();
        let checkpoint = app.checkpoint;
        tokio::task::spawn_blocking(move || extract_file(&path, &options, &output_dir, checkpoint))
    });
    let results = join_all(tasks).await;

    spinner.finish_and_clear();

    let total = results.len();
    let mut outcomes = Vec::new();
    for (path, joined) in app.paths.iter().zip(results) {
        match joined.map_err(|e| eyre!(e)).and_then(|r| r) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => eprintln!("{} {}: {:#}", "error".red().bold(), path.display(), e),
        }
    }

    if app.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        output_formatted(&outcomes);
    }

    let failed = total - outcomes.len();
    if failed > 0 {
        return Err(Error::BatchFailed { failed, total }.into());
    }

    Ok(())
}

fn extract_file(
    path: &Path,
    options: &ExtractOptions,
    output_dir: &Path,
    checkpoint: bool,
) -> Result<Outcome> {
    let bytes = std::fs::read(path).wrap_err_with(|| f!("reading {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::BadPath(path.display().to_string()))?;

    let composited = output_dir.join(f!("{stem}.redline.pdf"));
    let flowing = output_dir.join(f!("{stem}.redline.docx"));

    let rasterizer = PdfiumRasterizer::new(&bytes).map_err(|e| eyre!(e))?;
    let detector = AlignmentTableDetector::new(options.table.clone());

    let extraction = if checkpoint {
        redline::extract_with_checkpoint(&bytes, &rasterizer, &detector, options, &composited)
    } else {
        redline::extract_with(&bytes, &rasterizer, &detector, options)
    }
    .map_err(|e| eyre!(e))?;

    std::fs::write(&composited, &extraction.composited)
        .wrap_err_with(|| f!("writing {}", composited.display()))?;
    std::fs::write(&flowing, &extraction.flowing)
        .wrap_err_with(|| f!("writing {}", flowing.display()))?;

    log::info!(
        "{}: {} regions over {} pages",
        path.display(),
        extraction.report.regions_emitted,
        extraction.report.pages
    );

    Ok(Outcome {
        source: path.to_path_buf(),
        composited,
        flowing,
        report: extraction.report,
    })
}

fn output_formatted(outcomes: &[Outcome]) {
    if outcomes.is_empty() {
        return;
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "File".bold().cyan(),
        "Pages".bold().cyan(),
        "Flagged".bold().cyan(),
        "Headings".bold().cyan(),
        "Tables".bold().cyan(),
        "Figures".bold().cyan(),
        "Regions".bold().cyan(),
        "Skipped".bold().cyan(),
    ]);

    for outcome in outcomes {
        let report = &outcome.report;
        let skipped = if report.regions_skipped > 0 {
            report.regions_skipped.to_string().yellow().to_string()
        } else {
            report.regions_skipped.to_string()
        };
        table.add_row(prettytable::row![
            outcome.source.display().to_string().bright_white(),
            report.pages,
            f!("{}/{}", report.flagged_blocks, report.blocks),
            report.headings_flushed,
            report.tables_posted,
            f!("{}/{}", report.figures_emitted, report.figures_catalogued),
            report.regions_emitted.to_string().green(),
            skipped,
        ]);
    }

    table.printstd();
    println!();

    for outcome in outcomes {
        println!(
            "{} {}",
            "wrote".bright_black(),
            outcome.composited.display()
        );
        println!("{} {}", "wrote".bright_black(), outcome.flowing.display());
    }
}
