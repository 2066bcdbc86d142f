use std::io::Read;

use serde::{Deserialize, Deserializer};

use super::super::domain::{EvidenceCategory, EvidenceId, EvidenceItem};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("unable to read evidence manifest: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: unknown evidence category '{value}'")]
    UnknownCategory { row: usize, value: String },
}

/// Parse an evidence manifest exported by the content team.
///
/// Columns: `id,category,name,description,tags,media`; tags are `;`-separated.
pub(crate) fn parse_manifest<R: Read>(reader: R) -> Result<Vec<EvidenceItem>, ManifestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut items = Vec::new();

    for (index, record) in csv_reader.deserialize::<ManifestRow>().enumerate() {
        let row = record?;
        let category =
            EvidenceCategory::parse(&row.category).ok_or_else(|| ManifestError::UnknownCategory {
                row: index + 1,
                value: row.category.clone(),
            })?;

        items.push(EvidenceItem {
            id: EvidenceId::new(row.id),
            name: row.name,
            category,
            tags: split_tags(row.tags.as_deref()),
            description: row.description,
            media: row.media,
        });
    }

    Ok(items)
}

#[derive(Debug, Deserialize)]
struct ManifestRow {
    id: String,
    category: String,
    name: String,
    description: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tags: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    media: Option<String>,
}

fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_ascii_lowercase)
            .collect()
    })
    .unwrap_or_default()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_rows_with_optional_columns() {
        let csv = "id,category,name,description,tags,media\n\
                   ev-1,CCTV,Lobby camera,Camera facing the lobby,video; Lobby,media://a.mp4\n\
                   ev-2,physical,Knife,Recovered kitchen knife,,\n";

        let items = parse_manifest(Cursor::new(csv)).expect("manifest parses");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].category, EvidenceCategory::Cctv);
        assert_eq!(items[0].tags, vec!["video", "lobby"]);
        assert_eq!(items[1].category, EvidenceCategory::PhysicalEvidence);
        assert!(items[1].tags.is_empty());
        assert!(items[1].media.is_none());
    }

    #[test]
    fn reports_unknown_categories_with_row_number() {
        let csv = "id,category,name,description,tags,media\nev-1,rumour,Gossip,Overheard,,\n";

        match parse_manifest(Cursor::new(csv)) {
            Err(ManifestError::UnknownCategory { row, value }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "rumour");
            }
            other => panic!("expected unknown category, got {other:?}"),
        }
    }
}
