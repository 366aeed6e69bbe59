//! Note reply parser.
//!
//! A reply is a sequence of blocks separated by `---` lines. Inside a
//! block, `CONTENT:` and `IMPLICATIONS:` accumulate continuation lines
//! joined by spaces, `EXAMPLES:` takes one example per line, and the
//! single-line fields (`NOTE:`, `IMPORTANCE:`, `TITLE:`) ignore
//! continuations. A block without a known type, a title and content is
//! dropped.

use chrono::Utc;
use uuid::Uuid;

use super::{strip_brackets, tokenize, Marker, Token, NOTE_MARKERS};
use crate::notes::{Importance, LiteraryNote, NoteContext, NoteType};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Content,
    Examples,
    Implications,
}

#[derive(Default)]
struct BlockBuilder {
    note_type: Option<NoteType>,
    importance: Option<Importance>,
    title: String,
    content: String,
    examples: Vec<String>,
    implications: String,
    touched: bool,
}

impl BlockBuilder {
    fn build(self, ctx: &NoteContext) -> Option<LiteraryNote> {
        let note_type = self.note_type?;
        if self.title.is_empty() || self.content.is_empty() {
            return None;
        }
        Some(LiteraryNote {
            id: Uuid::new_v4().to_string(),
            pass_number: ctx.pass_number,
            section_id: ctx.section_id.clone(),
            location: ctx.location.clone(),
            provider: ctx.provider.clone(),
            note_type,
            importance: self.importance.unwrap_or_default(),
            title: self.title,
            content: self.content,
            examples: self.examples,
            implications: self.implications,
            created_at: Utc::now(),
        })
    }
}

fn append_words(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

fn push_example(examples: &mut Vec<String>, line: &str) {
    let example = line.trim().trim_start_matches(['-', '*', '•']).trim();
    if !example.is_empty() {
        examples.push(example.to_string());
    }
}

/// Parse every well-formed note in `reply`.
pub fn parse_notes(reply: &str, ctx: &NoteContext) -> Vec<LiteraryNote> {
    let mut notes = Vec::new();
    let mut block = BlockBuilder::default();
    let mut field = Field::None;

    for token in tokenize(reply, NOTE_MARKERS) {
        match token {
            Token::Separator(_) => {
                if block.touched {
                    notes.extend(std::mem::take(&mut block).build(ctx));
                }
                field = Field::None;
            }
            Token::Marker(marker, rest) => {
                block.touched = true;
                field = Field::None;
                match marker {
                    Marker::Note => {
                        block.note_type = strip_brackets(rest).parse().ok();
                    }
                    Marker::Importance => {
                        block.importance = strip_brackets(rest).parse().ok();
                    }
                    Marker::Title => {
                        block.title = strip_brackets(rest).to_string();
                    }
                    Marker::Content => {
                        block.content.clear();
                        append_words(&mut block.content, rest);
                        field = Field::Content;
                    }
                    Marker::Examples => {
                        push_example(&mut block.examples, rest);
                        field = Field::Examples;
                    }
                    Marker::Implications => {
                        block.implications.clear();
                        append_words(&mut block.implications, rest);
                        field = Field::Implications;
                    }
                    _ => {}
                }
            }
            Token::Text(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                block.touched = true;
                match field {
                    Field::Content => append_words(&mut block.content, line),
                    Field::Examples => push_example(&mut block.examples, line),
                    Field::Implications => append_words(&mut block.implications, line),
                    Field::None => {}
                }
            }
        }
    }
    if block.touched {
        notes.extend(block.build(ctx));
    }
    notes
}
