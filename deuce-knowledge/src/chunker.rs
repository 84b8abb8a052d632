/// Upper bound for a single section before it is split on paragraphs.
pub const MAX_CHUNK_CHARS: usize = 1500;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub title: Option<String>,
    pub content: String,
    pub index: usize,
}

/// Split markdown into heading sections, merging sections shorter than
/// `min_chars` into their successor and splitting oversized ones.
pub fn chunk_markdown(input: &str, min_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_title: Option<String> = None;
    let mut current_lines: Vec<&str> = Vec::new();

    for line in input.lines() {
        if let Some(title) = parse_heading(line) {
            push_section(&mut chunks, current_title.take(), &current_lines);
            current_title = Some(title);
            current_lines.clear();
        } else {
            current_lines.push(line);
        }
    }
    push_section(&mut chunks, current_title, &current_lines);

    let merged = merge_small_chunks(chunks, min_chars);
    split_large_chunks(merged, MAX_CHUNK_CHARS)
}

/// Plain text has no headings; paragraphs are packed up to the size cap.
pub fn chunk_plain(input: &str) -> Vec<Chunk> {
    let content = input.trim();
    if content.is_empty() {
        return Vec::new();
    }
    split_large_chunks(
        vec![Chunk {
            title: None,
            content: content.to_string(),
            index: 0,
        }],
        MAX_CHUNK_CHARS,
    )
}

fn push_section(chunks: &mut Vec<Chunk>, title: Option<String>, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    if content.is_empty() {
        return;
    }
    chunks.push(Chunk {
        title,
        content,
        index: chunks.len(),
    });
}

pub(crate) fn parse_heading(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn merge_small_chunks(chunks: Vec<Chunk>, min_chars: usize) -> Vec<Chunk> {
    if chunks.len() <= 1 {
        return chunks;
    }

    let mut merged: Vec<Chunk> = Vec::new();
    let mut iter = chunks.into_iter().peekable();
    while let Some(mut current) = iter.next() {
        while current.content.len() < min_chars {
            let Some(next) = iter.next() else { break };
            current.content.push_str("\n\n");
            current.content.push_str(&next.content);
            if current.title.is_none() {
                current.title = next.title;
            }
        }
        current.index = merged.len();
        merged.push(current);
    }

    merged
}

fn split_large_chunks(chunks: Vec<Chunk>, max_chars: usize) -> Vec<Chunk> {
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.content.len() <= max_chars {
            out.push(chunk);
            continue;
        }

        let mut buffer = String::new();
        for paragraph in chunk.content.split("\n\n").map(str::trim) {
            if paragraph.is_empty() {
                continue;
            }
            if !buffer.is_empty() && buffer.len() + paragraph.len() + 2 > max_chars {
                out.push(Chunk {
                    title: chunk.title.clone(),
                    content: std::mem::take(&mut buffer),
                    index: 0,
                });
            }
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(paragraph);
        }
        if !buffer.is_empty() {
            out.push(Chunk {
                title: chunk.title.clone(),
                content: buffer,
                index: 0,
            });
        }
    }

    for (index, chunk) in out.iter_mut().enumerate() {
        chunk.index = index;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_markdown_by_heading() {
        let input = "# Title\nIntro\n\n## Section\nContent";
        let chunks = chunk_markdown(input, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title.as_deref(), Some("Title"));
        assert!(chunks[0].content.contains("Intro"));
        assert_eq!(chunks[1].title.as_deref(), Some("Section"));
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn small_sections_are_merged() {
        let input = "# A\nshort\n# B\nalso short\n# C\nstill short";
        let chunks = chunk_markdown(input, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title.as_deref(), Some("A"));
        assert!(chunks[0].content.contains("still short"));
    }

    #[test]
    fn hashtags_are_not_headings() {
        assert_eq!(parse_heading("#hydration matters"), None);
        assert_eq!(parse_heading("## Hydration").as_deref(), Some("Hydration"));
        assert_eq!(parse_heading("####### too deep"), None);
    }

    #[test]
    fn oversized_sections_split_on_paragraphs() {
        let paragraph = "word ".repeat(200);
        let input = format!("# Long\n{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = chunk_markdown(&input, 0);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.content.len() <= MAX_CHUNK_CHARS));
        assert!(chunks.iter().all(|c| c.title.as_deref() == Some("Long")));
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(chunk_markdown("\n\n   \n", 200).is_empty());
        assert!(chunk_plain("  ").is_empty());
    }
}
