use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use docx_reformat::config::{init_default_config, FormatterConfig};
use docx_reformat::format::report::write_report_json;
use docx_reformat::progress::ConsoleProgress;
use docx_reformat::service::{handle_format_request, FormatRequest};

#[derive(Parser, Debug)]
#[command(name = "docx-reformat")]
#[command(about = "Thesis-style DOCX reformatter: headings, spacing, margins and page numbers", long_about = None)]
struct Args {
    /// Write the default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx (drag-and-drop supported)
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx (default: Formatted_Project.docx next to the input)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Config file path (default: search for docx-reformat.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON report of what was changed
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,

    /// No progress output on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docx-reformat <input.docx>\n\nTIPS:\n  - Default config search: docx-reformat.toml (upwards), or set DOCX_REFORMAT_CONFIG.\n"
            );
            return Ok(());
        }
    };

    let (cfg, cfg_path) = FormatterConfig::resolve(args.config.as_deref()).context("load config")?;
    match &cfg_path {
        Some(p) => progress.info(format!("config: {}", p.display())),
        None => progress.info("config: built-in defaults"),
    }

    let output = args
        .output
        .unwrap_or_else(|| input.with_file_name(&cfg.output.file_name));

    let data = std::fs::read(&input).with_context(|| format!("read input: {}", input.display()))?;
    let file_name = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let req = FormatRequest {
        file_name: &file_name,
        data: &data,
    };
    let resp = handle_format_request(&req, &cfg, &progress)
        .map_err(|e| anyhow::anyhow!("{e} (status {})", e.status()))?;

    std::fs::write(&output, &resp.body)
        .with_context(|| format!("write output: {}", output.display()))?;
    if let Some(report_path) = &args.report {
        write_report_json(&resp.report, report_path)?;
    }
    progress.info(resp.report.summary());
    progress.info(format!("wrote {}", output.display()));
    Ok(())
}
