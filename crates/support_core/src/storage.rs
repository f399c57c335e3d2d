use crate::corpus::{load_corpus, CorpusLoad};
use crate::eval::EvalCase;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads a corpus file. I/O and JSON syntax errors fail the load; malformed
/// items inside a well-formed file are reported in `CorpusLoad::skipped`.
pub fn load_corpus_file(path: &Path) -> Result<CorpusLoad> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse corpus json {}", path.display()))?;
    Ok(load_corpus(&value))
}

pub fn load_eval_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let cases: Vec<EvalCase> =
        serde_json::from_reader(BufReader::new(file)).context("parse eval cases json")?;
    Ok(cases)
}
