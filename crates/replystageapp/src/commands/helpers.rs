use super::StagedFile;
use crate::error::{Result, StageError};
use crate::store::AttachmentStore;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Shortest uuid prefix accepted as a selector.
pub const MIN_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileSelector {
    /// 1-based position among free files.
    Index(usize),
    Uuid(Uuid),
    Prefix(String),
}

pub fn parse_selector(input: &str) -> Result<FileSelector> {
    let input = input.trim();

    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        return match input.parse::<usize>() {
            Ok(0) | Err(_) => Err(StageError::Validation(format!(
                "'{}' is not a valid position, positions start at 1",
                input
            ))),
            Ok(index) => Ok(FileSelector::Index(index)),
        };
    }

    if let Ok(uuid) = Uuid::parse_str(input) {
        return Ok(FileSelector::Uuid(uuid));
    }

    let looks_like_prefix = input.len() >= MIN_PREFIX_LEN
        && input.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    if looks_like_prefix {
        return Ok(FileSelector::Prefix(input.to_ascii_lowercase()));
    }

    Err(StageError::Validation(format!(
        "'{}' is neither a position nor a uuid (prefixes need {} characters)",
        input, MIN_PREFIX_LEN
    )))
}

/// Parses every input, dropping duplicates while keeping the first occurrence.
pub fn parse_selectors<I: AsRef<str>>(inputs: &[I]) -> Result<Vec<FileSelector>> {
    let mut seen = HashSet::new();
    let mut selectors = Vec::new();
    for input in inputs {
        let selector = parse_selector(input.as_ref())?;
        if seen.insert(selector.clone()) {
            selectors.push(selector);
        }
    }
    Ok(selectors)
}

/// Every staged file in store order, taken ones included.
pub fn staged_files(store: &AttachmentStore) -> Vec<StagedFile> {
    let entries = store.map_ordered(|_, record, meta| Some((Arc::clone(record), meta.clone())));

    let mut next_index = 1;
    entries
        .iter()
        .map(|(record, meta)| {
            let index = if meta.is_taken() {
                None
            } else {
                next_index += 1;
                Some(next_index - 1)
            };
            StagedFile::from_record(index, record, meta)
        })
        .collect()
}

/// Resolves selectors to files, in selector order and without duplicates.
pub fn resolve_selectors(
    store: &AttachmentStore,
    selectors: &[FileSelector],
) -> Result<Vec<StagedFile>> {
    let files = staged_files(store);
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for selector in selectors {
        let file = match selector {
            FileSelector::Index(index) => files
                .iter()
                .find(|f| f.index == Some(*index))
                .ok_or_else(|| {
                    StageError::Validation(format!("No staged file at position {}", index))
                })?,
            FileSelector::Uuid(uuid) => files
                .iter()
                .find(|f| f.uuid == *uuid)
                .ok_or(StageError::NotFound(*uuid))?,
            FileSelector::Prefix(prefix) => {
                let matches: Vec<&StagedFile> = files
                    .iter()
                    .filter(|f| f.uuid.to_string().starts_with(prefix.as_str()))
                    .collect();
                match matches.as_slice() {
                    [file] => *file,
                    [] => {
                        return Err(StageError::Validation(format!(
                            "No staged file matches \"{}\"",
                            prefix
                        )))
                    }
                    many => {
                        return Err(StageError::Validation(format!(
                            "\"{}\" matches {} files, add more characters",
                            prefix,
                            many.len()
                        )))
                    }
                }
            }
        };

        if seen.insert(file.uuid) {
            resolved.push(file.clone());
        }
    }

    Ok(resolved)
}
