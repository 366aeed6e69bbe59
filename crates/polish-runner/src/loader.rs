//! Plain-text documents: blank-line-separated paragraphs.

use polish_coordination::{Document, TextUnit};

/// Paragraphs of `text`, trimmed, with inner line breaks kept.
pub fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

/// Pair source and translation paragraph by paragraph.
///
/// The first pair is the title unit. When one side has more paragraphs
/// the other side is left empty, so those units are skipped.
pub fn load_document(original: &str, translated: &str) -> Document {
    let originals = paragraphs(original);
    let translations = paragraphs(translated);
    let count = originals.len().max(translations.len());

    let title = translations
        .first()
        .or(originals.first())
        .cloned()
        .unwrap_or_default();
    let mut doc = Document::new(title);

    for idx in 0..count {
        let source = originals.get(idx).cloned().unwrap_or_default();
        let target = translations.get(idx).cloned().unwrap_or_default();
        let unit = if idx == 0 {
            TextUnit::new("title", "Title", source, target)
        } else {
            TextUnit::new(
                format!("paragraph_{idx}"),
                format!("Paragraph {idx}"),
                source,
                target,
            )
        };
        doc.push(unit);
    }
    doc
}

/// Render the document back as paragraphs.
pub fn render_document(doc: &Document) -> String {
    let mut out = doc.texts().join("\n\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_split() {
        let text = "Title\n\n\nFirst line\nsecond line\n   \nLast\n";
        assert_eq!(
            paragraphs(text),
            vec!["Title", "First line\nsecond line", "Last"]
        );
    }

    #[test]
    fn test_load_pairs_units() {
        let doc = load_document("Встреча\n\nПривет\n\nПока", "Сусрет\n\nЗдраво");
        assert_eq!(doc.title, "Сусрет");
        assert_eq!(doc.unit_count(), 3);
        assert_eq!(doc.units[0].section_id, "title");
        assert_eq!(doc.units[1].section_id, "paragraph_1");
        assert_eq!(doc.units[1].location, "Paragraph 1");
        assert_eq!(doc.units[2].current, "");
        assert_eq!(doc.polishable_count(), 2);
    }

    #[test]
    fn test_render() {
        let doc = load_document("a\n\nb", "x\n\ny");
        assert_eq!(render_document(&doc), "x\n\ny\n");
    }
}
