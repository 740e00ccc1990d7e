//! Size-bounded chunking of source documents.
//!
//! Documents are packed greedily, in order, into chunks of at most
//! `max_size` bytes. A document is never split: one that is larger than the
//! bound on its own becomes a dedicated oversized chunk, and the buffer
//! collected before it is flushed separately. Zero-byte documents never open
//! a chunk of their own; their names stay in input order within a neighbour.
//! Concatenating the chunks in index order yields exactly the concatenation
//! of the input documents.

use std::ops::Range;
use std::path::Path;

use walkdir::WalkDir;

use crate::errors::ServiceError;

/// A named piece of text, typically one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub content: String,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// One slice of the concatenated input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub total: usize,
    /// Byte range into the concatenation of all documents.
    pub range: Range<usize>,
    pub content: String,
    /// Names of the documents packed into this chunk, in order.
    pub documents: Vec<String>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Default)]
struct Buffer {
    start: usize,
    content: String,
    documents: Vec<String>,
}

impl Buffer {
    fn push(&mut self, doc: &SourceDocument) {
        self.content.push_str(&doc.content);
        self.documents.push(doc.name.clone());
    }

    fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}

/// Split `documents` into chunks of at most `max_size` bytes (except oversized
/// single documents).
pub fn split(documents: &[SourceDocument], max_size: usize) -> Vec<Chunk> {
    let mut pieces: Vec<Buffer> = Vec::new();
    let mut buffer = Buffer::default();
    let mut offset = 0;

    for doc in documents {
        let size = doc.content.len();

        if size > max_size {
            let mut oversized = Buffer {
                start: offset,
                ..Buffer::default()
            };
            if buffer.has_content() {
                pieces.push(std::mem::take(&mut buffer));
            } else {
                // zero-byte documents read since the last flush lead the oversized chunk
                oversized.documents = std::mem::take(&mut buffer.documents);
            }
            oversized.push(doc);
            pieces.push(oversized);
            offset += size;
            buffer.start = offset;
            continue;
        }

        if buffer.has_content() && buffer.content.len() + size > max_size {
            pieces.push(std::mem::take(&mut buffer));
            buffer.start = offset;
        }
        buffer.push(doc);
        offset += size;
    }

    if buffer.has_content() {
        pieces.push(buffer);
    } else if let Some(last) = pieces.last_mut() {
        last.documents.append(&mut buffer.documents);
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Chunk {
            index,
            total,
            range: piece.start..piece.start + piece.content.len(),
            content: piece.content,
            documents: piece.documents,
        })
        .collect()
}

/// Concatenate chunk contents in index order.
pub fn concat(chunks: &[Chunk]) -> String {
    chunks.iter().map(|c| c.content.as_str()).collect()
}

/// Recursively collect files under `root` whose extension is `extension`
/// (without the leading dot), sorted by path. Names are relative to `root`.
pub fn collect_sources(root: &Path, extension: &str) -> Result<Vec<SourceDocument>, ServiceError> {
    if !root.is_dir() {
        return Err(ServiceError::RepositoryNotFound {
            path: root.to_path_buf(),
        });
    }
    let extension = extension.trim_start_matches('.');

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }

        let content =
            std::fs::read_to_string(entry.path()).map_err(|source| ServiceError::SourceRead {
                path: entry.path().to_path_buf(),
                source,
            })?;
        let name = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        documents.push(SourceDocument { name, content });
    }

    tracing::debug!(root = %root.display(), extension, files = documents.len(), "collected sources");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn docs(sizes: &[usize]) -> Vec<SourceDocument> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let fill = (b'a' + (i % 26) as u8) as char;
                SourceDocument::new(format!("doc{}", i), fill.to_string().repeat(size))
            })
            .collect()
    }

    fn all_content(documents: &[SourceDocument]) -> String {
        documents.iter().map(|d| d.content.as_str()).collect()
    }

    #[test]
    fn test_concat_reproduces_input_for_many_bounds() {
        let documents = docs(&[5, 17, 0, 3, 40, 8, 8, 8, 1, 25]);
        let expected = all_content(&documents);
        for max in 1..=60 {
            let chunks = split(&documents, max);
            assert_eq!(concat(&chunks), expected, "max_size = {}", max);
        }
    }

    #[test]
    fn test_chunks_respect_bound_unless_single_document() {
        let documents = docs(&[4, 4, 4, 12, 4, 4]);
        let chunks = split(&documents, 10);
        for chunk in &chunks {
            assert!(chunk.len() <= 10 || chunk.documents.len() == 1);
        }
    }

    #[test]
    fn test_greedy_packing() {
        let documents = docs(&[4, 4, 4, 4]);
        let chunks = split(&documents, 8);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].documents, vec!["doc0", "doc1"]);
        assert_eq!(chunks[1].documents, vec!["doc2", "doc3"]);
    }

    #[test]
    fn test_exact_fit_is_not_flushed_early() {
        let documents = docs(&[5, 5]);
        let chunks = split(&documents, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 10);
    }

    #[test]
    fn test_oversized_document_is_isolated() {
        let documents = docs(&[3, 50, 3]);
        let chunks = split(&documents, 10);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].documents, vec!["doc0"]);
        assert_eq!(chunks[1].documents, vec!["doc1"]);
        assert_eq!(chunks[1].len(), 50);
        assert_eq!(chunks[2].documents, vec!["doc2"]);
    }

    #[test]
    fn test_empty_documents_keep_their_place() {
        let documents = vec![
            SourceDocument::new("Empty.java", ""),
            SourceDocument::new("Big.java", "b".repeat(50)),
            SourceDocument::new("Small.java", "abc"),
            SourceDocument::new("Trailing.java", ""),
        ];
        let chunks = split(&documents, 10);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].documents, vec!["Empty.java", "Big.java"]);
        assert_eq!(chunks[1].documents, vec!["Small.java", "Trailing.java"]);
        let names: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.documents.iter().map(String::as_str))
            .collect();
        let input: Vec<&str> = documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, input);
    }

    #[test]
    fn test_trailing_empty_document_joins_last_chunk() {
        let documents = vec![
            SourceDocument::new("Big.java", "b".repeat(50)),
            SourceDocument::new("Empty.java", ""),
        ];
        let chunks = split(&documents, 10);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].documents, vec!["Big.java", "Empty.java"]);
        assert_eq!(chunks[0].range, 0..50);
    }

    #[test]
    fn test_consecutive_oversized_documents() {
        let documents = docs(&[20, 30]);
        let chunks = split(&documents, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[1].len(), 30);
    }

    #[test]
    fn test_indices_totals_and_ranges() {
        let documents = docs(&[6, 6, 6, 6, 6]);
        let chunks = split(&documents, 12);
        let expected = all_content(&documents);

        assert_eq!(chunks.len(), 3);
        let mut next_start = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.total, 3);
            assert_eq!(chunk.range.start, next_start);
            assert_eq!(&expected[chunk.range.clone()], chunk.content);
            next_start = chunk.range.end;
        }
        assert_eq!(next_start, expected.len());
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split(&[], 10).is_empty());
        assert!(split(&docs(&[0, 0]), 10).is_empty());
    }

    #[test]
    fn test_zero_bound_isolates_every_document() {
        let documents = docs(&[1, 2, 3]);
        let chunks = split(&documents, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(concat(&chunks), all_content(&documents));
    }

    #[test]
    fn test_multibyte_content_is_measured_in_bytes() {
        let documents = vec![
            SourceDocument::new("a", "ééé"), // 6 bytes
            SourceDocument::new("b", "ü"),   // 2 bytes
        ];
        let chunks = split(&documents, 7);
        assert_eq!(chunks.len(), 2);
        assert_eq!(concat(&chunks), "éééü");
    }

    #[test]
    fn test_collect_sources_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/main/java/com")).unwrap();
        fs::write(dir.path().join("src/main/java/com/B.java"), "class B {}").unwrap();
        fs::write(dir.path().join("src/main/java/com/A.java"), "class A {}").unwrap();
        fs::write(dir.path().join("src/main/java/com/notes.txt"), "ignore me").unwrap();
        fs::write(dir.path().join("Root.JAVA"), "class Root {}").unwrap();

        let documents = collect_sources(dir.path(), "java").unwrap();
        let names: Vec<&str> = documents.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(
            names,
            vec!["Root.JAVA", "src/main/java/com/A.java", "src/main/java/com/B.java"]
        );
        assert_eq!(documents[1].content, "class A {}");
    }

    #[test]
    fn test_collect_sources_accepts_leading_dot() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let documents = collect_sources(dir.path(), ".rs").unwrap();
        assert_eq!(documents.len(), 1);
    }

    #[test]
    fn test_collect_sources_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            collect_sources(&missing, "java"),
            Err(ServiceError::RepositoryNotFound { .. })
        ));
    }
}
