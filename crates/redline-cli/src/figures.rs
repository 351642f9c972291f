use std::path::PathBuf;

use colored::Colorize;

use crate::prelude::{println, *};

#[derive(Debug, clap::Args, Clone)]
pub struct App {
    /// Path to the PDF file
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write each figure's image to this directory
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let bytes = std::fs::read(&app.path).wrap_err_with(|| f!("reading {}", app.path.display()))?;
    let catalog = redline::figures(&bytes).map_err(|e| eyre!(e))?;

    if global.verbose {
        println!("{} figures in {}", catalog.len(), app.path.display());
    }

    if let Some(dir) = &app.export {
        let written = catalog.export(dir).map_err(|e| eyre!(e))?;
        if global.verbose {
            println!("wrote {} figures to {}", written.len(), dir.display());
        }
    }

    if app.json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    if catalog.is_empty() {
        println!("{}", "No figures found.".bright_black());
        return Ok(());
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "Id".bold().cyan(),
        "Page".bold().cyan(),
        "Format".bold().cyan(),
        "Pixels".bold().cyan(),
        "DPI".bold().cyan(),
        "Box".bold().cyan(),
    ]);
    for figure in catalog.iter() {
        table.add_row(prettytable::row![
            figure.id.to_string().bright_yellow(),
            figure.page,
            figure.format,
            f!("{}x{}", figure.width, figure.height),
            f!("{:.0}x{:.0}", figure.dpi.0, figure.dpi.1),
            figure.bbox,
        ]);
    }
    table.printstd();

    Ok(())
}
