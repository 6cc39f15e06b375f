//! Error types for `pulso-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// An event with this idempotency key is already stored. Backends
  /// raise this only when the stored row cannot be re-read after a
  /// uniqueness conflict; the normal duplicate path is
  /// [`crate::store::EventWrite::Duplicate`].
  #[error("event already recorded for idempotency key {0:?}")]
  DuplicateEvent(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
