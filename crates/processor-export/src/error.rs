use std::path::PathBuf;
use thiserror::Error;

/// Failure writing one output artifact.
///
/// Group scoped: the group is marked failed, other groups keep exporting.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Creating, flushing, renaming or removing an output file failed.
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another group of the same batch already writes this path.
    #[error("{path} is already written by group {claimed_by} in this batch")]
    NameCollision { path: PathBuf, claimed_by: String },

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = ExportError::io(
            "/out/vcenter_vms_client-a_prod_20240115_120000.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("vcenter_vms_client-a_prod_20240115_120000.csv"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_name_collision_names_owner() {
        let err = ExportError::NameCollision {
            path: PathBuf::from("/out/vcenter_vms_acme_corp_prod_20240115_120000.csv"),
            claimed_by: "acme corp/prod".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vcenter_vms_acme_corp_prod_20240115_120000.csv"));
        assert!(msg.contains("acme corp/prod"));
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ExportError = json_err.into();
        assert!(err.to_string().starts_with("JSON export failed"));
    }
}
