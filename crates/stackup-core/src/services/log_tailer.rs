use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use tokio::time::{interval, Duration};

use crate::error::Result;

/// Read the last N lines of a service log.
pub fn read_tail(file_path: &Path, line_count: usize) -> String {
    match std::fs::read_to_string(file_path) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(line_count);
            lines[start..].join("\n")
        }
        Err(_) => String::new(),
    }
}

/// Poll `file_path` for appended lines and hand each one to `on_line`.
///
/// Starts at the current end of the file and runs until the caller drops the
/// future.
pub async fn follow<F: FnMut(&str)>(file_path: &Path, mut on_line: F) -> Result<()> {
    while !file_path.exists() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    let mut last_position = std::fs::metadata(file_path)?.len();

    let mut tick = interval(Duration::from_millis(250));
    loop {
        tick.tick().await;
        if let Ok(new_pos) = read_new_content(file_path, last_position, &mut on_line) {
            last_position = new_pos;
        }
    }
}

fn read_new_content<F: FnMut(&str)>(
    path: &Path,
    last_position: u64,
    on_line: &mut F,
) -> std::io::Result<u64> {
    let mut file = std::fs::OpenOptions::new().read(true).open(path)?;

    let metadata = file.metadata()?;
    if metadata.len() < last_position {
        // Truncated or replaced: start over.
        return Ok(0);
    }
    if metadata.len() == last_position {
        return Ok(last_position);
    }

    file.seek(SeekFrom::Start(last_position))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let new_position = file.stream_position()?;

    for line in content.lines() {
        if !line.is_empty() {
            on_line(line);
        }
    }

    Ok(new_position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn tail_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nova.log");
        fs::write(&path, "a\nb\nc\nd\n").unwrap();
        assert_eq!(read_tail(&path, 2), "c\nd");
        assert_eq!(read_tail(&path, 10), "a\nb\nc\nd");
        assert_eq!(read_tail(&dir.path().join("missing.log"), 5), "");
    }

    #[test]
    fn new_content_is_read_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        fs::write(&path, "one\ntwo\n").unwrap();

        let mut seen = Vec::new();
        let pos = read_new_content(&path, 4, &mut |l: &str| seen.push(l.to_string())).unwrap();
        assert_eq!(seen, vec!["two"]);
        assert_eq!(pos, 8);

        fs::write(&path, "x\n").unwrap();
        let pos = read_new_content(&path, pos, &mut |_: &str| {}).unwrap();
        assert_eq!(pos, 0);
    }
}
