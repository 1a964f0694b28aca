//! JSONL and JSON persistence for corpora, datasets and reports

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use ragprobe_core::{Chunk, Corpus, Dataset, Error, Result, SyntheticRecord};

/// Read one JSON value per non-blank line
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| {
            Error::Serialization(format!("{}:{}: {}", path.display(), line_no + 1, e))
        })?;
        items.push(item);
    }

    debug!(path = %path.display(), items = items.len(), "read jsonl");
    Ok(items)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(File::create(path)?))
}

/// Write one JSON value per line, replacing the file
pub fn write_jsonl<'a, T, I>(path: impl AsRef<Path>, items: I) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let path = path.as_ref();
    let mut writer = create(path)?;
    let mut count = 0;
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    debug!(path = %path.display(), items = count, "wrote jsonl");
    Ok(count)
}

/// Write a pretty-printed JSON document
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let mut writer = create(path.as_ref())?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn load_corpus(path: impl AsRef<Path>) -> Result<Corpus> {
    Corpus::new(read_jsonl::<Chunk>(path)?)
}

pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    Ok(Dataset::new(read_jsonl::<SyntheticRecord>(path)?))
}

pub fn save_dataset(path: impl AsRef<Path>, dataset: &Dataset) -> Result<usize> {
    write_jsonl(path, dataset.iter())
}
