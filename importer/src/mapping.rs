//! Pure mappings from raw import records to `NewDocument`s.
//!
//! Participant records arrive with either English or localized field names;
//! both resolve to the same `Participant` before anything touches the store.

use cardex_core::NewDocument;
use serde_json::{Map, Value};
use std::path::Path;

pub const PARTICIPANT_TYPE: &str = "PARTICIPANT";
pub const JSON_TYPE: &str = "JSON";
pub const TXT_TYPE: &str = "TXT";

const UNTITLED: &str = "Без названия";

/// Fields of one participant, keyed by (english, localized) name.
const ADDRESS: (&str, &str) = ("address", "Адрес");
const PHONE: (&str, &str) = ("phone", "Телефон");
const ADDITIONAL: (&str, &str) = ("additional", "Дополнительно");
const DETAILS: (&str, &str) = ("details", "Подробности");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub additional: String,
    pub details: String,
}

impl Participant {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        // An English key wins when present, even if empty.
        let name = match field(fields, "name") {
            Some(name) => name,
            None => format!(
                "{} {}",
                field(fields, "Фамилия").unwrap_or_default(),
                field(fields, "Имя").unwrap_or_default()
            ),
        };
        let either = |(english, localized): (&str, &str)| {
            field(fields, english).or_else(|| field(fields, localized)).unwrap_or_default()
        };
        Self {
            id: field(fields, "id").unwrap_or_default(),
            name: name.trim().to_string(),
            address: either(ADDRESS),
            phone: either(PHONE),
            additional: either(ADDITIONAL),
            details: either(DETAILS),
        }
    }

    pub fn title(&self) -> String {
        if self.name.is_empty() {
            format!("Участник №{}", self.id)
        } else {
            self.name.clone()
        }
    }

    /// The searchable body card.
    pub fn card(&self) -> String {
        format!(
            "Участник ГСПК №{}\n\nФИО: {}\nАдрес: {}\nТелефон: {}\nДополнительно: {}\nПодробности: {}",
            self.id, self.name, self.address, self.phone, self.additional, self.details
        )
        .trim()
        .to_string()
    }

    pub fn into_document(self, source: &str) -> NewDocument {
        NewDocument::new(self.title(), self.card(), PARTICIPANT_TYPE).source(source)
    }
}

fn field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).map(|value| match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Split a free-text participant file into field maps. A line starting with
/// `Участник` or `№` opens a new record named after that line; `key: value`
/// lines fill the current record.
pub fn parse_participant_text(content: &str) -> Vec<Map<String, Value>> {
    let mut records = Vec::new();
    let mut current = Map::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("Участник") || line.starts_with('№') {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            current.insert("name".into(), Value::String(line.to_string()));
        } else if let Some((key, value)) = line.split_once(':') {
            current.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
        }
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// A generic JSON item stored verbatim as its compact JSON text.
pub fn json_item_document(item: &Value, source: &str) -> NewDocument {
    let title = item
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNTITLED);
    NewDocument::new(title, item.to_string(), JSON_TYPE).source(source)
}

pub fn text_file_document(path: &Path, content: &str) -> NewDocument {
    let title = path.file_stem().and_then(|s| s.to_str()).unwrap_or(UNTITLED);
    let path = path.display().to_string();
    NewDocument::new(title, content, TXT_TYPE).source(path.clone()).file_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn english_fields_map_directly() {
        let p = Participant::from_fields(&object(json!({
            "id": "SAMPLE001",
            "name": "Ivanov Ivan",
            "address": "Moscow",
            "phone": "555",
        })));
        assert_eq!(p.id, "SAMPLE001");
        assert_eq!(p.name, "Ivanov Ivan");
        assert_eq!(p.address, "Moscow");
        assert_eq!(p.phone, "555");
        assert_eq!(p.details, "");
    }

    #[test]
    fn localized_fields_map_to_the_same_shape() {
        let p = Participant::from_fields(&object(json!({
            "id": 17,
            "Фамилия": "Иванов",
            "Имя": "Иван",
            "Адрес": "г. Москва",
            "Телефон": "+7 (123) 456-78-90",
            "Подробности": "бокс 12",
        })));
        assert_eq!(p.id, "17");
        assert_eq!(p.name, "Иванов Иван");
        assert_eq!(p.address, "г. Москва");
        assert_eq!(p.phone, "+7 (123) 456-78-90");
        assert_eq!(p.details, "бокс 12");
    }

    #[test]
    fn nameless_participant_gets_numbered_title() {
        let p = Participant::from_fields(&object(json!({ "id": "42" })));
        assert_eq!(p.name, "");
        assert_eq!(p.title(), "Участник №42");
    }

    #[test]
    fn card_lists_every_field() {
        let doc = Participant::from_fields(&object(json!({
            "id": "1", "name": "Ivanov Ivan", "address": "Moscow", "phone": "555",
        })))
        .into_document("participants.json");
        assert_eq!(doc.doc_type, PARTICIPANT_TYPE);
        assert_eq!(doc.source, "participants.json");
        assert!(doc.body.starts_with("Участник ГСПК №1\n\nФИО: Ivanov Ivan\nАдрес: Moscow\nТелефон: 555"));
    }

    #[test]
    fn text_records_split_on_headers() {
        let text = "Участник №1\nАдрес: Москва\nТелефон: 111\n\n№2 Петров\nАдрес: Казань\nnot a field\n";
        let records = parse_participant_text(text);
        assert_eq!(records.len(), 2);
        let second = Participant::from_fields(&records[1]);
        assert_eq!(second.name, "№2 Петров");
        assert_eq!(second.address, "Казань");
    }

    #[test]
    fn json_items_keep_their_json() {
        let item = json!({ "name": "Бокс 7", "owner": "Иванов" });
        let doc = json_item_document(&item, "box.json");
        assert_eq!(doc.title, "Бокс 7");
        assert_eq!(doc.doc_type, JSON_TYPE);
        assert!(doc.body.contains("\"owner\":\"Иванов\""));

        let unnamed = json_item_document(&json!({ "n": 1 }), "box.json");
        assert_eq!(unnamed.title, UNTITLED);
    }

    #[test]
    fn text_files_are_titled_by_stem() {
        let doc = text_file_document(Path::new("scans/protocol_2024.txt"), "minutes");
        assert_eq!(doc.title, "protocol_2024");
        assert_eq!(doc.doc_type, TXT_TYPE);
        assert_eq!(doc.file_path, "scans/protocol_2024.txt");
    }
}
