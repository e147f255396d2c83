use crate::mapping::{json_item_document, parse_participant_text, text_file_document, Participant};
use anyhow::{Context, Result};
use cardex_core::NewDocument;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMPORTABLE: [&str; 3] = ["json", "jsonl", "txt"];

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|s| s.to_str())
}

/// Importable files under `input` (or `input` itself), in a stable order.
pub fn collect_files(input: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && extension(p).is_some_and(|ext| IMPORTABLE.contains(&ext)) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

/// JSON records of a `.json` (array or single object) or `.jsonl` file.
pub fn read_json_records(path: &Path) -> Result<Vec<Value>> {
    let f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(f);
    if extension(path) == Some("jsonl") {
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            records.push(serde_json::from_str(&line)?);
        }
        return Ok(records);
    }
    let json: Value = serde_json::from_reader(reader)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(match json {
        Value::Array(arr) => arr,
        obj @ Value::Object(_) => vec![obj],
        _ => Vec::new(),
    })
}

pub fn participants_from_file(path: &Path) -> Result<Vec<NewDocument>> {
    let source = path.display().to_string();
    let records = match extension(path) {
        Some("txt") => {
            let content = fs::read_to_string(path).with_context(|| format!("failed to read {source}"))?;
            parse_participant_text(&content)
        }
        _ => read_json_records(path)?
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect(),
    };
    Ok(records.iter().map(|fields| Participant::from_fields(fields).into_document(&source)).collect())
}

pub fn documents_from_file(path: &Path) -> Result<Vec<NewDocument>> {
    match extension(path) {
        Some("txt") => {
            let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            Ok(vec![text_file_document(path, &content)])
        }
        _ => {
            let source = path.display().to_string();
            Ok(read_json_records(path)?.iter().map(|item| json_item_document(item, &source)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collects_only_importable_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "[]").unwrap();
        fs::write(dir.path().join("b.txt"), "text").unwrap();
        fs::write(dir.path().join("c.pdf"), "%PDF").unwrap();
        let files = collect_files(dir.path());
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, ["a.json", "b.txt"]);
    }

    #[test]
    fn reads_array_object_and_lines() {
        let dir = tempdir().unwrap();
        let array = dir.path().join("array.json");
        fs::write(&array, r#"[{"name":"a"},{"name":"b"}]"#).unwrap();
        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"name":"c"}"#).unwrap();
        let lines = dir.path().join("lines.jsonl");
        fs::write(&lines, "{\"name\":\"d\"}\n\n{\"name\":\"e\"}\n").unwrap();

        assert_eq!(read_json_records(&array).unwrap().len(), 2);
        assert_eq!(read_json_records(&object).unwrap().len(), 1);
        assert_eq!(read_json_records(&lines).unwrap().len(), 2);
    }

    #[test]
    fn participants_from_json_and_text() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("participants.json");
        fs::write(&json, r#"[{"id":"1","name":"Ivanov Ivan","address":"Moscow"},{"id":"2","Фамилия":"Петров","Имя":"Пётр"}]"#).unwrap();
        let docs = participants_from_file(&json).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].title, "Петров Пётр");
        assert_eq!(docs[0].source, json.display().to_string());

        let txt = dir.path().join("participants.txt");
        fs::write(&txt, "Участник №3\nАдрес: Казань\n").unwrap();
        let docs = participants_from_file(&txt).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].body.contains("Адрес: Казань"));
    }
}
