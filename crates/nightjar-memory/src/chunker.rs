// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-oriented Markdown chunker.
//!
//! Chunks flush when the accumulated byte length would exceed
//! `chunk_tokens * 4` (the approximate token-to-byte ratio), carrying
//! `chunk_overlap * 4` trailing bytes into the next chunk. Lines longer
//! than a whole chunk are split into segments; segments of one line share
//! its line number. Line numbers are 1-based inclusive.

use sha2::{Digest, Sha256};

/// A bounded slice of a Markdown file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub hash: String,
}

/// Hex-encoded SHA-256 of a string.
pub fn hash_text(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Split content into chunks of at most `tokens * 4` bytes with
/// `overlap * 4` bytes of trailing carry.
pub fn chunk_markdown(content: &str, tokens: usize, overlap: usize) -> Vec<Chunk> {
    let max_chars = (tokens * 4).max(32);
    let overlap_chars = overlap * 4;

    struct LineRec {
        line: String,
        no: usize,
    }

    let mut cur: Vec<LineRec> = Vec::new();
    let mut cur_chars = 0usize;
    let mut chunks: Vec<Chunk> = Vec::new();

    fn flush(cur: &[LineRec], chunks: &mut Vec<Chunk>) {
        if cur.is_empty() {
            return;
        }
        let text = cur
            .iter()
            .map(|r| r.line.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        chunks.push(Chunk {
            start_line: cur[0].no,
            end_line: cur[cur.len() - 1].no,
            hash: hash_text(&text),
            text,
        });
    }

    fn carry(cur: &mut Vec<LineRec>, cur_chars: &mut usize, overlap_chars: usize) {
        if overlap_chars == 0 || cur.is_empty() {
            cur.clear();
            *cur_chars = 0;
            return;
        }
        let mut keep: Vec<LineRec> = Vec::new();
        let mut acc = 0usize;
        while let Some(rec) = cur.pop() {
            acc += rec.line.len() + 1;
            keep.push(rec);
            if acc >= overlap_chars {
                break;
            }
        }
        keep.reverse();
        *cur_chars = keep.iter().map(|r| r.line.len() + 1).sum();
        *cur = keep;
    }

    for (i, line) in content.split('\n').enumerate() {
        let line_no = i + 1;
        let mut segments: Vec<&str> = Vec::new();
        if !line.is_empty() && line.len() > max_chars {
            let bytes = line.as_bytes();
            let mut start = 0;
            while start < bytes.len() {
                let mut end = (start + max_chars).min(bytes.len());
                // Do not split inside a UTF-8 sequence.
                while end < bytes.len() && !line.is_char_boundary(end) {
                    end -= 1;
                }
                segments.push(&line[start..end]);
                start = end;
            }
        } else {
            segments.push(line);
        }

        for seg in segments {
            let size = seg.len() + 1;
            if cur_chars + size > max_chars && !cur.is_empty() {
                flush(&cur, &mut chunks);
                carry(&mut cur, &mut cur_chars, overlap_chars);
            }
            cur.push(LineRec {
                line: seg.to_string(),
                no: line_no,
            });
            cur_chars += size;
        }
    }
    flush(&cur, &mut chunks);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_one_chunk() {
        let chunks = chunk_markdown("alpha\nbeta\ngamma", 400, 80);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[0].text, "alpha\nbeta\ngamma");
    }

    #[test]
    fn chunk_hash_is_content_hash() {
        let chunks = chunk_markdown("alpha", 400, 0);
        assert_eq!(chunks[0].hash, hash_text("alpha"));
    }

    #[test]
    fn single_long_line_splits_and_covers_once() {
        // tokens=8 -> max 32 bytes per chunk. One 100-byte line.
        let line = "x".repeat(100);
        let chunks = chunk_markdown(&line, 8, 0);
        assert!(chunks.len() > 1, "expected multiple chunks");

        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, line, "concatenation must cover the line exactly once");
        for c in &chunks {
            assert_eq!(c.start_line, 1);
            assert_eq!(c.end_line, 1);
            assert!(c.text.len() <= 32);
        }
    }

    #[test]
    fn overlap_carries_trailing_lines() {
        // max 32 bytes, overlap 8 bytes: each 10-byte line flushes
        // chunks of ~3 lines and carries the last line forward.
        let content = (0..10).map(|i| format!("line-{i:04}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_markdown(&content, 8, 2);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_last = pair[0].text.lines().last().unwrap();
            assert!(
                pair[1].text.lines().next().unwrap() == prev_last,
                "next chunk should start with the carried line"
            );
        }
    }

    #[test]
    fn line_numbers_are_one_based_inclusive() {
        let content = (0..12).map(|i| format!("row {i} with some padding")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_markdown(&content, 16, 0);
        assert_eq!(chunks[0].start_line, 1);
        let last = chunks.last().unwrap();
        assert_eq!(last.end_line, 12);
        for c in &chunks {
            assert!(c.start_line <= c.end_line);
        }
    }

    #[test]
    fn empty_content_yields_single_empty_chunk() {
        let chunks = chunk_markdown("", 400, 80);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }
}
