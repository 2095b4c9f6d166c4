use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{CeremonyError, Result, VisibleCursor};

/// One unit of paired text revealed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSegment {
    pub order: usize,
    pub primary_text: String,
    pub secondary_text: String,
}

impl ContentSegment {
    pub fn new(order: usize, primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            order,
            primary_text: primary.into(),
            secondary_text: secondary.into(),
        }
    }
}

/// Source of the ordered segment list.
pub trait ContentProvider {
    fn fetch(&self, content_id: &str) -> Result<Vec<ContentSegment>>;
}

/// Provider backed by an in-memory list.
#[derive(Debug, Clone, Default)]
pub struct StaticContentProvider {
    segments: Vec<ContentSegment>,
}

impl StaticContentProvider {
    pub fn new(segments: Vec<ContentSegment>) -> Self {
        Self { segments }
    }
}

impl ContentProvider for StaticContentProvider {
    fn fetch(&self, _content_id: &str) -> Result<Vec<ContentSegment>> {
        Ok(self.segments.clone())
    }
}

#[derive(Debug, Deserialize)]
struct EditionsDocument {
    data: Vec<Edition>,
}

#[derive(Debug, Deserialize)]
struct Edition {
    ayahs: Vec<EditionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditionEntry {
    number_in_surah: usize,
    text: String,
}

/// Reads a two-edition document (`data[0]` primary text, `data[1]`
/// secondary text) saved from the content service.
#[derive(Debug, Clone)]
pub struct EditionsFileProvider {
    path: PathBuf,
}

impl EditionsFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(raw: &str) -> Result<Vec<ContentSegment>> {
        let document: EditionsDocument = serde_json::from_str(raw)?;
        let [primary, secondary] = document.data.as_slice() else {
            return Err(CeremonyError::ContentUnavailable(format!(
                "expected two editions, found {}",
                document.data.len()
            )));
        };
        if primary.ayahs.len() != secondary.ayahs.len() {
            return Err(CeremonyError::ContentUnavailable(
                "editions differ in length".to_string(),
            ));
        }

        let mut pairs: Vec<_> = primary.ayahs.iter().zip(&secondary.ayahs).collect();
        pairs.sort_by_key(|(entry, _)| entry.number_in_surah);
        Ok(pairs
            .into_iter()
            .enumerate()
            .map(|(order, (primary, secondary))| {
                ContentSegment::new(order, primary.text.clone(), secondary.text.clone())
            })
            .collect())
    }
}

impl ContentProvider for EditionsFileProvider {
    fn fetch(&self, content_id: &str) -> Result<Vec<ContentSegment>> {
        tracing::debug!(content_id, path = %self.path.display(), "loading content");
        let raw = std::fs::read_to_string(&self.path)?;
        Self::parse(&raw)
    }
}

/// Loading state of the segment list as seen by presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentState {
    #[default]
    Loading,
    Ready(Vec<ContentSegment>),
    Unavailable(String),
}

impl ContentState {
    pub fn load<P: ContentProvider + ?Sized>(provider: &P, content_id: &str) -> Self {
        match provider.fetch(content_id) {
            Ok(segments) => {
                tracing::info!(content_id, segments = segments.len(), "content ready");
                Self::Ready(segments)
            }
            Err(err) => {
                tracing::warn!(content_id, %err, "content unavailable");
                Self::Unavailable(err.to_string())
            }
        }
    }

    pub fn segments(&self) -> &[ContentSegment] {
        match self {
            Self::Ready(segments) => segments,
            Self::Loading | Self::Unavailable(_) => &[],
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Text to show instead of the segment list, if any.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Loading => Some("Loading…"),
            Self::Unavailable(_) => Some("Content is unavailable right now."),
            Self::Ready(segments) if segments.is_empty() => Some("Nothing to recite yet."),
            Self::Ready(_) => None,
        }
    }
}

/// Segments whose primary text is visible under `cursor`.
pub fn revealed_segments(segments: &[ContentSegment], cursor: VisibleCursor) -> &[ContentSegment] {
    let visible = segments
        .iter()
        .take_while(|segment| cursor.reveals(segment.order))
        .count();
    &segments[..visible]
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "code": 200,
        "data": [
            { "ayahs": [
                { "number": 2, "numberInSurah": 2, "text": "second" },
                { "number": 1, "numberInSurah": 1, "text": "first" }
            ] },
            { "ayahs": [
                { "number": 2, "numberInSurah": 2, "text": "Second" },
                { "number": 1, "numberInSurah": 1, "text": "First" }
            ] }
        ]
    }"#;

    struct FailingProvider;

    impl ContentProvider for FailingProvider {
        fn fetch(&self, _content_id: &str) -> Result<Vec<ContentSegment>> {
            Err(CeremonyError::ContentUnavailable("offline".to_string()))
        }
    }

    #[test]
    fn parses_paired_editions_in_order() {
        let segments = EditionsFileProvider::parse(DOCUMENT).unwrap();
        assert_eq!(
            segments,
            vec![
                ContentSegment::new(0, "first", "First"),
                ContentSegment::new(1, "second", "Second"),
            ]
        );
    }

    #[test]
    fn rejects_single_edition() {
        let err = EditionsFileProvider::parse(r#"{ "data": [ { "ayahs": [] } ] }"#).unwrap_err();
        assert!(matches!(err, CeremonyError::ContentUnavailable(_)));
    }

    #[test]
    fn failed_fetch_becomes_unavailable_state() {
        let state = ContentState::load(&FailingProvider, "surah/1");
        assert!(matches!(state, ContentState::Unavailable(_)));
        assert!(state.segments().is_empty());
        assert!(state.placeholder().is_some());
    }

    #[test]
    fn missing_file_becomes_unavailable_state() {
        let provider = EditionsFileProvider::new("/nonexistent/editions.json");
        assert!(!ContentState::load(&provider, "surah/1").is_ready());
    }

    #[test]
    fn reveal_prefix_follows_cursor() {
        let segments: Vec<_> = (0..3)
            .map(|order| ContentSegment::new(order, "a", "b"))
            .collect();

        assert!(revealed_segments(&segments, VisibleCursor::HIDDEN).is_empty());
        assert_eq!(revealed_segments(&segments, VisibleCursor::at(1)).len(), 2);
        assert_eq!(revealed_segments(&segments, VisibleCursor::at(9)).len(), 3);
        assert!(revealed_segments(&[], VisibleCursor::at(0)).is_empty());
        assert_eq!(revealed_segments(&segments, VisibleCursor::at(usize::MAX)).len(), 3);
    }
}
