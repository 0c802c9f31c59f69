//! Utilities for input/output.

use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;

/// Deserializes JSON data from the file at the given path.
pub fn read_data_from_json<T: DeserializeOwned>(file_path: &Path) -> io::Result<T> {
    let file = fs::File::open(file_path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Could not parse JSON file {}: {}",
                file_path.display(),
                err
            ),
        )
    })
}

/// Serializes the given data into JSON and saves it at the given path.
///
/// The data is written to a temporary file in the same directory, which is
/// then renamed to the target path, so readers never observe a partially
/// written file.
pub fn save_data_as_json_atomically<T: Serialize>(file_path: &Path, data: &T) -> io::Result<()> {
    let directory = match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(directory)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file_mut());
        serde_json::to_writer(&mut writer, data)?;
        writer.flush()?;
    }
    temp_file.persist(file_path).map_err(|err| err.error)?;
    Ok(())
}
