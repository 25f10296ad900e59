//! Errors reported by the name mempool index.

use bitcoin::Txid;

/// Failures of the name index's consistency scan.
///
/// The scan is a sanity check; any of these means the index and the host
/// pool (or the chain state) have drifted apart.  The host decides
/// whether to abort or to rebuild the index.
#[derive(Debug, thiserror::Error)]
pub enum NamePoolError {
    /// A tracked entry and the per-name maps disagree.
    #[error("name index entry for {0} does not match the maps")]
    IndexMismatch(Txid),

    /// The per-name maps track more or fewer entries than exist.
    #[error("name index sizes do not match the tracked entries")]
    IndexSizeMismatch,

    /// A pending registration targets a name that is alive at the next
    /// block.
    #[error("pending registration of unexpired name '{0}'")]
    RegistrationOfLiveName(String),

    /// A pending update targets a name that is missing or expired at the
    /// next block.
    #[error("pending update of missing or expired name '{0}'")]
    UpdateOfMissingName(String),

    /// Reading the chain state failed.
    #[error(transparent)]
    State(#[from] nmc_state::Error),
}
