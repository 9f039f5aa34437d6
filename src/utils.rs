use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use url::Url;

fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("download_{}", uuid::Uuid::new_v4()));
    Ok(name)
}

// Letters, digits, '.', '-' and '_' survive; anything else becomes '_'.
fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            c if c.is_alphanumeric() => c,
            '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

pub fn destination_path(url: &str, download_dir: &Path, output: Option<PathBuf>) -> Result<PathBuf> {
    match output {
        Some(path) => Ok(path),
        None => Ok(download_dir.join(safe_file_name(&file_name_from_url(url)?))),
    }
}
