use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeeAlsoError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("couldn't decode see-also data in {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Related-artist pairs from a hand-curated sidecar file (`see-also.json`,
/// a JSON list of `[artist, artist]` pairs).
///
/// The file is re-read on every lookup, so edits show up without a restart.
/// Names are not checked against the catalog.
#[derive(Debug, Clone, Default)]
pub struct SeeAlso {
    path: Option<PathBuf>,
}

impl SeeAlso {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A lookup with no sidecar file; every query returns nothing.
    pub fn none() -> Self {
        Self { path: None }
    }

    /// All stored pairs. A missing file means no pairs.
    pub fn pairs(&self) -> Result<Vec<Vec<String>>, SeeAlsoError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("{} not found, no see-also data", path.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(SeeAlsoError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&data).map_err(|source| SeeAlsoError::Decode {
            path: path.clone(),
            source,
        })
    }

    /// Artists directly paired with `artist`, in file order. No transitive closure.
    pub fn related(&self, artist: &str) -> Result<Vec<String>, SeeAlsoError> {
        let mut related = Vec::new();
        for pair in self.pairs()? {
            let [a, b] = pair.as_slice() else {
                log::warn!("Ignoring see-also entry with {} names: {pair:?}", pair.len());
                continue;
            };
            if a == artist {
                related.push(b.clone());
            }
            if b == artist {
                related.push(a.clone());
            }
        }
        Ok(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_pairs(dir: &Path, json: &str) -> SeeAlso {
        let path = dir.join("see-also.json");
        std::fs::write(&path, json).unwrap();
        SeeAlso::new(path)
    }

    #[test]
    fn test_related_is_symmetric() {
        let dir = tempfile::tempdir().unwrap();
        let see_also = write_pairs(
            dir.path(),
            r#"[["Jack Johnson", "Donavon Frankenreiter"], ["Ben Harper", "Jack Johnson"]]"#,
        );
        assert_eq!(
            see_also.related("Jack Johnson").unwrap(),
            vec!["Donavon Frankenreiter", "Ben Harper"]
        );
        assert_eq!(see_also.related("Donavon Frankenreiter").unwrap(), vec!["Jack Johnson"]);
    }

    #[test]
    fn test_no_transitive_closure_and_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let see_also = write_pairs(dir.path(), r#"[["A", "B"], ["B", "C"]]"#);
        assert_eq!(see_also.related("A").unwrap(), vec!["B"]);
        assert!(see_also.related("a").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let see_also = SeeAlso::new(dir.path().join("see-also.json"));
        assert!(see_also.related("Anyone").unwrap().is_empty());
        assert!(SeeAlso::none().related("Anyone").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let see_also = write_pairs(dir.path(), r#"{"not": "pairs"}"#);
        assert!(matches!(see_also.related("A"), Err(SeeAlsoError::Decode { .. })));
    }

    #[test]
    fn test_bad_pair_length_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let see_also = write_pairs(dir.path(), r#"[["A"], ["A", "B", "C"], ["A", "D"]]"#);
        assert_eq!(see_also.related("A").unwrap(), vec!["D"]);
    }
}
