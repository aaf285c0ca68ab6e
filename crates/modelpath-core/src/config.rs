//! Reading and writing of the persisted search path configuration file.
//!
//! The file is line oriented. An optional `#V<n>` line carries the format
//! version, every other non-empty line is one length-prefixed record of
//! three fields: alias, path, description.

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::search_path::SearchPathEntry;
use crate::{CFG_VERSION, LEGACY_MODELS_VAR};

/// Read a configuration file into entries, in file order.
///
/// Returns the version declared in the file, or 0 when no version line is
/// present. Malformed lines are logged and skipped. Records referring to
/// the legacy system model variable are dropped; that directory is seeded
/// from the environment instead.
pub fn read_path_list(path: &Path) -> anyhow::Result<(u32, Vec<SearchPathEntry>)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read search path configuration {}", path.display()))?;

    let mut version = 0;
    let mut entries = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#V") {
            version = rest.trim().parse().unwrap_or(0);
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let fields = match modelpath_hollerith::parse_record(line) {
            Ok(fields) => fields,
            Err(e) => {
                log::warn!(
                    "Skipping malformed line {} in {}: {e}",
                    lineno + 1,
                    path.display()
                );
                continue;
            }
        };

        if fields.len() != 3 {
            log::warn!(
                "Skipping line {} in {}: expected 3 fields, found {}",
                lineno + 1,
                path.display(),
                fields.len()
            );
            continue;
        }

        let mut fields = fields.into_iter();
        let alias = fields.next().unwrap_or_default();
        let path_var = fields.next().unwrap_or_default();
        let description = fields.next().unwrap_or_default();

        // Old files persisted the system model directory; it is now always
        // derived from the environment.
        if alias == LEGACY_MODELS_VAR || path_var.contains(LEGACY_MODELS_VAR) {
            log::debug!("Dropping legacy {LEGACY_MODELS_VAR} record from {}", path.display());
            continue;
        }

        entries.push(SearchPathEntry::new(alias, path_var, description));
    }

    Ok((version, entries))
}

/// Write the configuration file, excluding the leading run of entries
/// managed from the environment.
pub fn write_path_list(path: &Path, entries: &[SearchPathEntry]) -> anyhow::Result<()> {
    let mut out = format!("#V{CFG_VERSION}\n");

    for entry in entries.iter().skip_while(|e| e.is_env_backed()) {
        let record = modelpath_hollerith::encode_record(&[
            &entry.alias,
            &entry.path_var,
            &entry.description,
        ]);
        out.push_str(&record);
        out.push('\n');
    }

    fs::write(path, out).with_context(|| {
        format!(
            "Failed to write search path configuration {}",
            path.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_cfg(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join(crate::CFG_FILENAME);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_versioned_file() {
        let dir = tempfile::tempdir().unwrap();
        let line = modelpath_hollerith::encode_record(&["MYLIB", "/opt/models", "main library"]);
        let path = write_cfg(dir.path(), &format!("#V1\n{line}\n"));

        let (version, entries) = read_path_list(&path).unwrap();
        assert_eq!(version, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].alias, "MYLIB");
        assert_eq!(entries[0].path_var, "/opt/models");
        assert_eq!(entries[0].description, "main library");
    }

    #[test]
    fn test_read_unversioned_file_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        let line = modelpath_hollerith::encode_record(&["MYLIB", "/opt/models", ""]);
        let path = write_cfg(dir.path(), &format!("{line}\n"));

        let (version, entries) = read_path_list(&path).unwrap();
        assert_eq!(version, 0);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let good = modelpath_hollerith::encode_record(&["MYLIB", "/opt/models", ""]);
        let path = write_cfg(dir.path(), &format!("#V1\nnot a record\n{good}\n\"9:short\"\n"));

        let (_, entries) = read_path_list(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].alias, "MYLIB");
    }

    #[test]
    fn test_read_drops_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = modelpath_hollerith::encode_record(&[
            LEGACY_MODELS_VAR,
            "/usr/share/3dmodels",
            "system models",
        ]);
        let token = modelpath_hollerith::encode_record(&[
            "OLD",
            &format!("${{{LEGACY_MODELS_VAR}}}/extra"),
            "",
        ]);
        let keep = modelpath_hollerith::encode_record(&["MYLIB", "/opt/models", ""]);
        let path = write_cfg(dir.path(), &format!("#V1\n{legacy}\n{token}\n{keep}\n"));

        let (_, entries) = read_path_list(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].alias, "MYLIB");
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_path_list(&dir.path().join(crate::CFG_FILENAME)).is_err());
    }

    #[test]
    fn test_write_skips_leading_env_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::CFG_FILENAME);

        let mut project = SearchPathEntry::new("${KIPRJMOD}", "${KIPRJMOD}", "project directory");
        project.path_expanded = "/work/project".to_string();
        let env = SearchPathEntry::new("${KISYS3DMOD}", "${KISYS3DMOD}", "");
        let user = SearchPathEntry::new("MYLIB", "/opt/models", "main library");

        write_path_list(&path, &[project, env, user]).unwrap();

        let (version, entries) = read_path_list(&path).unwrap();
        assert_eq!(version, CFG_VERSION);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].alias, "MYLIB");
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::CFG_FILENAME);

        let entries = vec![
            SearchPathEntry::new("MYLIB", "${HOME}/models", "main library, local"),
            SearchPathEntry::new("PARTS", "/opt/parts", ""),
        ];

        write_path_list(&path, &entries).unwrap();
        let (_, back) = read_path_list(&path).unwrap();
        assert_eq!(back, entries);
    }
}
