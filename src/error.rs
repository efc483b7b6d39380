//! CLI Error Types

use derive_more::{Display, Error};
use shelfsync_reconcile::error::Error as ReconcileError;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// The catalog file could not be read, decoded or written back.
    #[display("catalog file error: {}", _0.display())]
    CatalogFile(#[error(not(source))] std::path::PathBuf),
    #[display("device is not ready")]
    DeviceNotReady,
    #[display("sync failed")]
    Sync,
}
impl ErrorKind {
    /// Wrap a reconcile error, keeping whether it is worth retrying.
    #[track_caller]
    pub fn reconcile(err: ReconcileError) -> Error {
        if err.is_retryable() {
            err.raise(ErrorKind::DeviceNotReady)
        } else {
            err.raise(ErrorKind::Sync)
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceNotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_reconcile::error::ErrorKind as ReconcileKind;

    #[test]
    fn test_reconcile_keeps_retryability() {
        let busy = ErrorKind::reconcile(exn::Exn::from(ReconcileKind::DeviceUnavailable("indexing".into())));
        assert!(matches!(&*busy, ErrorKind::DeviceNotReady));
        assert!(busy.is_retryable());

        let broken = ErrorKind::reconcile(exn::Exn::from(ReconcileKind::Explorer));
        assert!(matches!(&*broken, ErrorKind::Sync));
        assert!(!broken.is_retryable());
    }
}
