use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use letterpress::{ConvertOptions, EngineChoice, LayoutStatus, PageFlow, Result};

#[derive(Parser)]
#[command(name = "letterpress")]
#[command(version)]
#[command(about = "Turn generated Markdown into letterhead-ready PDFs, and documents back into Markdown", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Flow {
    Single,
    Continuous,
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    Soffice,
    Builtin,
    Auto,
}

#[derive(Subcommand)]
enum Command {
    /// Extract Markdown from a PDF, DOCX or TXT file
    ToMd {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Where DOCX input also saves its Markdown (defaults to FILE with .md)
        #[arg(long, value_name = "FILE")]
        side_file: Option<PathBuf>,
    },

    /// Convert Markdown to PDF, DOCX or TXT (chosen by the output extension)
    FromMd {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Page flow for PDF output
        #[arg(long, value_enum, default_value = "single")]
        flow: Flow,

        /// Height of the letterhead spacer as a CSS length ("" disables it)
        #[arg(long, default_value = "3cm")]
        spacer: String,

        /// Extra CSS appended to the built-in stylesheet
        #[arg(long, value_name = "FILE")]
        css: Option<PathBuf>,

        /// Use only the built-in PDF fonts
        #[arg(long)]
        no_system_fonts: bool,

        /// Exit with an error when content overflows the page
        #[arg(long)]
        strict: bool,
    },

    /// Convert DOCX to PDF through a document engine
    DocxPdf {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "soffice")]
        engine: Engine,

        /// LibreOffice program to run
        #[arg(long, env = "LETTERPRESS_SOFFICE")]
        soffice: Option<String>,
    },

    /// Strip code-fence wrappers from generated Markdown (stdin if no FILE)
    Normalize {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Render Markdown to the HTML fragment the PDF is laid out from
    Html {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        #[arg(long, default_value = "3cm")]
        spacer: String,
    },
}

fn read_input(input: Option<&Path>) -> Result<String> {
    let mut text = String::new();
    match input {
        Some(path) => text = String::from_utf8(std::fs::read(path)?)?,
        None => {
            std::io::stdin().read_to_string(&mut text)?;
        }
    }
    Ok(text)
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => letterpress::save_markdown(text, path),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::ToMd {
            input,
            output,
            side_file,
        } => {
            let options = ConvertOptions {
                markdown_side_file: side_file,
                ..Default::default()
            };
            let md = letterpress::convert_to_markdown(&input, &options)?;
            write_output(output.as_deref(), &md)
        }
        Command::FromMd {
            input,
            output,
            flow,
            spacer,
            css,
            no_system_fonts,
            strict,
        } => {
            let mut options = ConvertOptions::default();
            options.render.flow = match flow {
                Flow::Single => PageFlow::Single,
                Flow::Continuous => PageFlow::Continuous,
            };
            options.render.letterhead_spacer = spacer;
            options.render.system_fonts = !no_system_fonts;
            options.render.fail_on_overflow = strict;
            if let Some(css) = css {
                options.render.stylesheet.push('\n');
                options.render.stylesheet.push_str(&std::fs::read_to_string(css)?);
            }
            if let Some(report) = letterpress::convert_markdown_file(&input, &output, &options)? {
                match report.status {
                    LayoutStatus::Fit => {
                        eprintln!("Wrote {} ({} page(s))", output.display(), report.page_count)
                    }
                    LayoutStatus::Overflow(rect) => eprintln!(
                        "Wrote {} ({} page(s)); content overflows by {:.1}pt",
                        output.display(),
                        report.page_count,
                        rect.height()
                    ),
                }
            }
            Ok(())
        }
        Command::DocxPdf {
            input,
            output,
            engine,
            soffice,
        } => {
            let engine = match (engine, soffice) {
                (Engine::Builtin, _) => EngineChoice::Builtin,
                (Engine::Auto, _) => EngineChoice::Auto,
                (Engine::Soffice, Some(program)) => EngineChoice::SofficeAt(program.into()),
                (Engine::Soffice, None) => EngineChoice::Soffice,
            };
            let options = ConvertOptions {
                engine,
                ..Default::default()
            };
            letterpress::convert(&input, &output, &options)?;
            eprintln!("Wrote {}", output.display());
            Ok(())
        }
        Command::Normalize { input } => {
            let raw = read_input(input.as_deref())?;
            write_output(None, &letterpress::normalize_markdown(&raw))
        }
        Command::Html { input, spacer } => {
            let raw = read_input(input.as_deref())?;
            let md = letterpress::normalize_markdown(&raw);
            write_output(None, &letterpress::markdown::render_with_spacer(&md, &spacer))
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
