//! DOCX → PDF through a document engine.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::config::ConvertOptions;
use crate::error::{Error, Result};

/// Environment variable naming the LibreOffice program.
pub const SOFFICE_ENV: &str = "LETTERPRESS_SOFFICE";

const DEFAULT_SOFFICE: &str = "soffice";

/// Something that can turn a DOCX file into a PDF file.
pub trait DocumentEngine {
    fn name(&self) -> &str;

    fn docx_to_pdf(&self, input: &Path, output: &Path, options: &ConvertOptions) -> Result<()>;
}

/// A locally installed LibreOffice run headless.
#[derive(Clone, Debug)]
pub struct SofficeEngine {
    program: OsString,
}

impl SofficeEngine {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program named by `LETTERPRESS_SOFFICE`, or `soffice` on the `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os(SOFFICE_ENV).unwrap_or_else(|| DEFAULT_SOFFICE.into()))
    }
}

impl Default for SofficeEngine {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DocumentEngine for SofficeEngine {
    fn name(&self) -> &str {
        "soffice"
    }

    fn docx_to_pdf(&self, input: &Path, output: &Path, _options: &ConvertOptions) -> Result<()> {
        let t0 = std::time::Instant::now();
        // Removed on drop, whichever way this function returns.
        let out_dir = tempfile::tempdir()?;

        let result = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir.path())
            .arg(input)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::EngineNotFound(self.program.to_string_lossy().into_owned())
                }
                _ => Error::Io(e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Engine(format!(
                "{} exited with {}: {}",
                self.program.to_string_lossy(),
                result.status,
                stderr.trim()
            )));
        }

        let stem = input
            .file_stem()
            .ok_or_else(|| Error::Engine(format!("no file name in {}", input.display())))?;
        let mut pdf_name = stem.to_os_string();
        pdf_name.push(".pdf");
        let produced = out_dir.path().join(pdf_name);
        if !produced.is_file() {
            return Err(Error::Engine(format!(
                "no PDF produced for {}",
                input.display()
            )));
        }
        std::fs::copy(&produced, output)?;

        log::info!(
            "DOCX → PDF via {}: {:.1}ms",
            self.program.to_string_lossy(),
            t0.elapsed().as_secs_f64() * 1000.0,
        );
        Ok(())
    }
}

/// The crate's own pipeline: DOCX → Markdown → HTML → layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinEngine;

impl DocumentEngine for BuiltinEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    fn docx_to_pdf(&self, input: &Path, output: &Path, options: &ConvertOptions) -> Result<()> {
        let markdown = crate::docx::docx_to_markdown(input, None)?;
        let report = super::markdown_to_pdf(&markdown, output, &options.render)?;
        log::debug!(
            "builtin engine: {} page(s), status {:?}",
            report.page_count,
            report.status
        );
        Ok(())
    }
}

/// Which engine DOCX → PDF conversions use.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum EngineChoice {
    /// LibreOffice, from `LETTERPRESS_SOFFICE` or the `PATH`.
    #[default]
    Soffice,
    /// LibreOffice at an explicit program path.
    SofficeAt(OsString),
    Builtin,
    /// LibreOffice when installed, the builtin pipeline otherwise.
    Auto,
}

impl EngineChoice {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "soffice" | "libreoffice" => Some(EngineChoice::Soffice),
            "builtin" => Some(EngineChoice::Builtin),
            "auto" => Some(EngineChoice::Auto),
            _ => None,
        }
    }
}

/// Convert `input` to PDF with the engine `options` selects.
pub fn docx_to_pdf(input: &Path, output: &Path, options: &ConvertOptions) -> Result<()> {
    match &options.engine {
        EngineChoice::Soffice => SofficeEngine::from_env().docx_to_pdf(input, output, options),
        EngineChoice::SofficeAt(program) => {
            SofficeEngine::new(program.clone()).docx_to_pdf(input, output, options)
        }
        EngineChoice::Builtin => BuiltinEngine.docx_to_pdf(input, output, options),
        EngineChoice::Auto => {
            match SofficeEngine::from_env().docx_to_pdf(input, output, options) {
                Err(Error::EngineNotFound(program)) => {
                    log::warn!("{program} not found, using the builtin engine");
                    BuiltinEngine.docx_to_pdf(input, output, options)
                }
                other => other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_program_is_engine_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        std::fs::write(&input, b"not really a docx").unwrap();
        let engine = SofficeEngine::new("letterpress-test-no-such-office");
        let err = engine
            .docx_to_pdf(&input, &dir.path().join("out.pdf"), &ConvertOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineNotFound);
        assert!(err.to_string().contains("letterpress-test-no-such-office"));
        assert!(!dir.path().join("out.pdf").exists());
    }

    #[test]
    fn engine_names_parse() {
        assert_eq!(EngineChoice::parse("LibreOffice"), Some(EngineChoice::Soffice));
        assert_eq!(EngineChoice::parse("builtin"), Some(EngineChoice::Builtin));
        assert_eq!(EngineChoice::parse("auto"), Some(EngineChoice::Auto));
        assert_eq!(EngineChoice::parse("word"), None);
    }
}
