//! Normalization of whatever the retrieval service returned into the block
//! of sources embedded in the rewritten prompt.

use serde::Serialize;
use serde_json::{ Map, Value };

/// Object keys under which retrieval services commonly nest their result list.
const LIST_KEYS: [&str; 4] = ["results", "chunks", "data", "documents"];

/// Chunk keys (with their aliases) that are lifted into typed fields.
const CHUNK_KEYS: [&str; 7] = ["sourceIndex", "index", "sourceUrl", "url", "source", "content", "text"];
const SCORE_KEYS: [&str; 2] = ["relevanceScore", "score"];

/// One retrieved passage. Decoding accepts `index`, `url`/`source`, `text`
/// and `score` in place of the camelCase names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    /// One-based position used in citations.
    pub source_index: usize,
    pub source_url: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
    /// Every upstream field not lifted into the fields above, kept as received.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl RetrievedChunk {
    /// The exact markdown a generated answer uses to cite this chunk.
    pub fn citation(&self) -> String {
        citation(self.source_index, &self.source_url)
    }

    /// Upstream fields other than index, URL and content, as one JSON line.
    /// The score is keyed `relevanceScore` whatever the upstream spelling was.
    fn metadata(&self) -> Option<String> {
        let mut fields = self.attributes.clone();
        if let Some(score) = self.relevance_score {
            fields.insert("relevanceScore".to_string(), Value::from(score));
        }
        if fields.is_empty() {
            return None;
        }
        serde_json::to_string(&fields).ok()
    }

    fn render(&self) -> String {
        let mut out = format!(
            "<source index=\"{}\" url=\"{}\">\nCite as: {}\n",
            self.source_index,
            self.source_url,
            self.citation()
        );
        if let Some(metadata) = self.metadata() {
            out.push_str("Metadata: ");
            out.push_str(&metadata);
            out.push('\n');
        }
        out.push_str(self.content.trim());
        out.push_str("\n</source>");
        out
    }
}

pub fn citation(index: usize, url: &str) -> String {
    format!("[{}]({})", index, url)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetrievedContext {
    Chunks(Vec<RetrievedChunk>),
    /// A result this crate does not understand, embedded as-is.
    Opaque(Value),
}

impl RetrievedContext {
    /// Returns `None` when the result carries nothing usable: `null`, a blank
    /// string, an empty list or object, or an object whose result list is empty.
    pub fn from_value(value: Value) -> Option<Self> {
        if is_empty_value(&value) {
            return None;
        }

        let list = match &value {
            Value::Array(items) => Some(items),
            Value::Object(map) => LIST_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array)),
            _ => None,
        };

        match list {
            Some(items) if items.is_empty() => None,
            Some(items) => match parse_chunks(items) {
                Some(chunks) => Some(RetrievedContext::Chunks(chunks)),
                None => Some(RetrievedContext::Opaque(value)),
            },
            None => Some(RetrievedContext::Opaque(value)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RetrievedContext::Chunks(chunks) => chunks.len(),
            RetrievedContext::Opaque(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the context for the `{sources}` slot of the prompt template.
    pub fn render(&self) -> String {
        match self {
            RetrievedContext::Chunks(chunks) => chunks
                .iter()
                .map(RetrievedChunk::render)
                .collect::<Vec<_>>()
                .join("\n\n"),
            RetrievedContext::Opaque(value) => serde_json::to_string_pretty(value)
                .unwrap_or_else(|_| value.to_string()),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn parse_chunk(item: &Value) -> Option<RetrievedChunk> {
    let object = item.as_object()?;
    let source_index = ["sourceIndex", "index"]
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_u64))
        .map_or(0, |i| i as usize);
    let source_url = ["sourceUrl", "url", "source"]
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))?;
    let content = ["content", "text"]
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))?;
    let relevance_score = SCORE_KEYS
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_f64));

    let attributes = object
        .iter()
        .filter(|(k, _)| !CHUNK_KEYS.contains(&k.as_str()))
        .filter(|(k, _)| relevance_score.is_none() || !SCORE_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Some(RetrievedChunk {
        source_index,
        source_url: source_url.to_string(),
        content: content.to_string(),
        relevance_score,
        attributes,
    })
}

/// All-or-nothing: a single element that is not chunk-shaped makes the whole
/// list opaque. Upstream indexes are kept only when every chunk has one.
fn parse_chunks(items: &[Value]) -> Option<Vec<RetrievedChunk>> {
    let mut chunks = items.iter().map(parse_chunk).collect::<Option<Vec<_>>>()?;

    if chunks.iter().any(|c| c.source_index == 0) {
        for (pos, chunk) in chunks.iter_mut().enumerate() {
            chunk.source_index = pos + 1;
        }
    }
    Some(chunks)
}

/// Extracts `[index](url)` citations from generated markdown, in order of
/// first appearance and without duplicates.
pub fn citations(text: &str) -> Vec<(usize, String)> {
    let mut found: Vec<(usize, String)> = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find("](") else { break };
        let label = &rest[..close];
        let Ok(index) = label.parse::<usize>() else { continue };
        let after = &rest[close + 2..];
        let Some(end) = after.find(')') else { break };
        let url = &after[..end];
        if !url.is_empty() && !url.contains(char::is_whitespace) {
            let entry = (index, url.to_string());
            if !found.contains(&entry) {
                found.push(entry);
            }
            rest = &after[end + 1..];
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn citation_is_index_link_to_url() {
        let chunk = RetrievedChunk {
            source_index: 3,
            source_url: "https://example.com/page".into(),
            content: "text".into(),
            relevance_score: None,
            attributes: Map::new(),
        };
        assert_eq!(chunk.citation(), "[3](https://example.com/page)");
    }

    #[test]
    fn nothing_usable_is_no_context() {
        for value in [Value::Null, json!(""), json!([]), json!({}), json!({ "results": [] })] {
            assert_eq!(RetrievedContext::from_value(value), None);
        }
    }

    #[test]
    fn top_level_chunk_list_keeps_upstream_order_and_indexes() {
        let value = json!([
            { "sourceIndex": 2, "sourceUrl": "https://b", "content": "second", "relevanceScore": 0.9 },
            { "sourceIndex": 1, "sourceUrl": "https://a", "content": "first" }
        ]);
        let Some(RetrievedContext::Chunks(chunks)) = RetrievedContext::from_value(value) else {
            panic!("expected chunks");
        };
        assert_eq!(chunks[0].source_index, 2);
        assert_eq!(chunks[0].relevance_score, Some(0.9));
        assert_eq!(chunks[1].source_url, "https://a");
    }

    #[test]
    fn nested_list_with_aliases_is_renumbered_from_one() {
        let value = json!({ "results": [
            { "url": "https://a", "text": "alpha", "score": 0.4 },
            { "url": "https://b", "text": "beta" }
        ] });
        let Some(RetrievedContext::Chunks(chunks)) = RetrievedContext::from_value(value) else {
            panic!("expected chunks");
        };
        let indexes: Vec<usize> = chunks.iter().map(|c| c.source_index).collect();
        assert_eq!(indexes, vec![1, 2]);
        assert_eq!(chunks[0].content, "alpha");
    }

    #[test]
    fn unknown_shapes_are_embedded_verbatim() {
        let value = json!({ "answer": "42", "passages": ["x"] });
        let ctx = RetrievedContext::from_value(value.clone()).unwrap();
        assert_eq!(ctx, RetrievedContext::Opaque(value));
        assert!(ctx.render().contains("\"answer\": \"42\""));

        let mixed = json!([{ "url": "https://a", "text": "ok" }, 7]);
        assert!(matches!(RetrievedContext::from_value(mixed), Some(RetrievedContext::Opaque(_))));
    }

    #[test]
    fn render_tags_each_chunk_with_index_and_url() {
        let ctx = RetrievedContext::Chunks(vec![
            RetrievedChunk {
                source_index: 1,
                source_url: "https://a".into(),
                content: " alpha ".into(),
                relevance_score: None,
                attributes: Map::new(),
            },
            RetrievedChunk {
                source_index: 2,
                source_url: "https://b".into(),
                content: "beta".into(),
                relevance_score: None,
                attributes: Map::new(),
            },
        ]);
        assert_eq!(
            ctx.render(),
            "<source index=\"1\" url=\"https://a\">\nCite as: [1](https://a)\nalpha\n</source>\n\n\
             <source index=\"2\" url=\"https://b\">\nCite as: [2](https://b)\nbeta\n</source>"
        );
    }

    #[test]
    fn render_keeps_score_and_unrecognized_fields() {
        let value = json!([{
            "sourceIndex": 1,
            "sourceUrl": "https://a",
            "content": "c",
            "relevanceScore": 0.93,
            "title": "WHO fact sheet",
            "section": { "heading": "Overview" }
        }]);
        let rendered = RetrievedContext::from_value(value).unwrap().render();

        assert!(rendered.starts_with("<source index=\"1\" url=\"https://a\">\nCite as: [1](https://a)\n"));
        assert!(rendered.contains("\"relevanceScore\":0.93"));
        assert!(rendered.contains("\"title\":\"WHO fact sheet\""));
        assert!(rendered.contains("\"section\":{\"heading\":\"Overview\"}"));
        assert!(rendered.ends_with("\nc\n</source>"));
    }

    #[test]
    fn aliased_score_is_rendered_under_one_key() {
        let value = json!({ "results": [{ "url": "https://a", "text": "alpha", "score": 0.4 }] });
        let rendered = RetrievedContext::from_value(value).unwrap().render();
        assert!(rendered.contains("Metadata: {\"relevanceScore\":0.4}"));
        assert!(!rendered.contains("\"score\""));
    }

    #[test]
    fn citations_are_extracted_in_order_without_duplicates() {
        let text = "BP above 130/80 is high [1](https://a). See [docs] and [2](https://b)[1](https://a). \
                    Not a cite: [x](https://c) or [3](no url here).";
        assert_eq!(citations(text), vec![(1, "https://a".to_string()), (2, "https://b".to_string())]);
    }
}
