use crate::libs::error::{FamilyError, Result};
use crate::libs::item::Item;
use indexmap::IndexMap;
use std::io::{BufRead, BufReader, BufWriter, Write};

/// ```
/// use std::io::BufRead;
/// let reader = tfam::reader("tests/items/scenario.tsv").unwrap();
/// let lines: Vec<_> = reader.lines().collect();
/// assert_eq!(lines.len(), 4);
/// ```
pub fn reader(input: &str) -> Result<Box<dyn BufRead>> {
    let reader: Box<dyn BufRead> = if input == "stdin" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let path = std::path::Path::new(input);
        let file = std::fs::File::open(path).map_err(|why| {
            std::io::Error::new(
                why.kind(),
                format!("could not open {}: {}", path.display(), why),
            )
        })?;

        if path.extension() == Some(std::ffi::OsStr::new("gz")) {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    };

    Ok(reader)
}

pub fn writer(output: &str) -> Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = if output == "stdout" {
        Box::new(BufWriter::new(std::io::stdout()))
    } else {
        Box::new(BufWriter::new(std::fs::File::create(output)?))
    };

    Ok(writer)
}

/// Parse items, one per line: `id<TAB>symbols[<TAB>strain]`.
///
/// Blank lines and lines starting with `#` are skipped. Ids must be unique.
pub fn parse_items<R: BufRead>(reader: R) -> Result<Vec<Item>> {
    let mut items: IndexMap<String, Item> = IndexMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() < 2 {
            return Err(FamilyError::Parse {
                line: i + 1,
                message: format!("expected `id<TAB>symbols`, found '{}'", trimmed),
            });
        }

        let id = fields[0].trim();
        if id.is_empty() {
            return Err(FamilyError::Parse {
                line: i + 1,
                message: "empty item id".to_string(),
            });
        }
        if items.contains_key(id) {
            return Err(FamilyError::Parse {
                line: i + 1,
                message: format!("duplicate item id '{}'", id),
            });
        }

        let mut item = Item::from_rvds(id, fields[1]);
        if let Some(strain) = fields.get(2).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            item = item.with_strain(strain);
        }
        items.insert(id.to_string(), item);
    }

    Ok(items.into_values().collect())
}

/// Read an item file, "stdin" for standard input.
pub fn read_items(input: &str) -> Result<Vec<Item>> {
    parse_items(reader(input)?)
}
