use std::path::PathBuf;

use redline::flow::DEFAULT_FLOW_DPI;

use crate::prelude::{println, *};

#[derive(Debug, clap::Args, Clone)]
pub struct App {
    /// Composited PDF written by `redline extract`
    pub path: PathBuf,

    /// Where to write the DOCX (defaults to the input with a .docx extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Points per inch used to size rasters in the DOCX output
    #[arg(long, env = "REDLINE_FLOW_DPI", default_value_t = DEFAULT_FLOW_DPI)]
    pub flow_dpi: f32,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let bytes = std::fs::read(&app.path).wrap_err_with(|| f!("reading {}", app.path.display()))?;
    let docx = redline::reflow(&bytes, app.flow_dpi).map_err(|e| eyre!(e))?;

    let output = app
        .output
        .unwrap_or_else(|| app.path.with_extension("docx"));
    std::fs::write(&output, &docx).wrap_err_with(|| f!("writing {}", output.display()))?;

    if global.verbose {
        println!("{} bytes", docx.len());
    }
    println!("{}", output.display());

    Ok(())
}
