//! Local OCR engine
//!
//! Shells out to the Tesseract CLI and reads its TSV report, so text and
//! per-word confidences come from a single run.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::image::{encode_png, DecodedImage};

/// Extracted text plus mean word confidence (0-100)
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to launch OCR engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("OCR engine exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("failed to prepare image: {0}")]
    Image(#[from] super::image::ImageError),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract(&self, image: &DecodedImage) -> Result<OcrOutput, OcrError>;
}

/// `tesseract stdin stdout tsv`
pub struct TesseractCli {
    command: String,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn extract(&self, image: &DecodedImage) -> Result<OcrOutput, OcrError> {
        let png = encode_png(&image.rgb)?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Rebuild text from word rows and average their positive confidences
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut text = String::new();
    let mut confidences: Vec<f32> = Vec::new();
    let mut last_line: Option<(u32, u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }

        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let line = (num(1), num(2), num(3), num(4));

        match last_line {
            Some(prev) if prev == line => text.push(' '),
            Some(prev) if (prev.0, prev.1, prev.2) == (line.0, line.1, line.2) => text.push('\n'),
            Some(_) => text.push_str("\n\n"),
            None => {}
        }
        text.push_str(word);
        last_line = Some(line);

        if let Ok(conf) = cols[10].parse::<f32>() {
            if conf > 0.0 {
                confidences.push(conf);
            }
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        let mean = confidences.iter().sum::<f32>() / confidences.len() as f32;
        (mean * 100.0).round() / 100.0
    };

    OcrOutput { text, confidence }
}
