//! Helpers for closing units of work.

use store::UnitOfWork;

use crate::DomainError;

/// Commits `uow` if `result` is a success, otherwise rolls it back.
///
/// A failed rollback is only logged; the original error wins.
pub(crate) async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, DomainError>,
) -> Result<T, DomainError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            discard(uow).await;
            Err(err)
        }
    }
}

/// Rolls back `uow`, logging a failed rollback.
pub(crate) async fn discard(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}
