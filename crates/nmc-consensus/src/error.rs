//! Rejection reasons for name transactions.

use bitcoin::OutPoint;

/// Why a transaction fails the name rules.
///
/// Each rule violation is a distinguishable variant so callers can
/// surface a precise block/tx rejection.
#[derive(Debug, thiserror::Error)]
pub enum NameTxError {
    /// A transaction without the name version bit has name inputs or
    /// outputs.
    #[error("non-name transaction has name inputs/outputs")]
    NonNameTxHasNameIO,

    #[error("multiple name inputs into transaction")]
    MultipleNameInputs,

    #[error("multiple name outputs from transaction")]
    MultipleNameOutputs,

    /// A transaction with the name version bit has no name output.
    #[error("name transaction has no name output")]
    NameTxWithoutNameOutput,

    /// The name output's coin value is below the locked-amount floor.
    #[error("greedy name")]
    GreedyName,

    #[error("NAME_NEW hash has wrong size {0}")]
    BadNewHashSize(usize),

    #[error("NAME_NEW with previous name input")]
    NewWithNameInput,

    /// FIRSTUPDATE or UPDATE without a name input to spend.
    #[error("name update without previous name input")]
    UpdateWithoutNameInput,

    #[error("NAME_FIRSTUPDATE with a previous input that is no NAME_NEW")]
    FirstUpdatePrevNotNew,

    /// The NAME_NEW input has fewer confirmations than the required
    /// maturity depth.
    #[error("NAME_NEW is not mature for FIRSTUPDATE")]
    FirstUpdateWithoutMatureNew,

    /// `H160(rand ∥ name)` does not match the committed hash.
    #[error("NAME_FIRSTUPDATE hash mismatch")]
    FirstUpdateCommitmentMismatch,

    /// The name is already registered and not expired.
    #[error("NAME_FIRSTUPDATE on an unexpired name")]
    FirstUpdateOnLiveName,

    #[error("trying to update an expired name")]
    UpdateOnExpiredName,

    /// Input and output name of an UPDATE differ.
    #[error("NAME_UPDATE name mismatch to previous output")]
    UpdateNameMismatch,

    #[error("NAME_UPDATE with a previous input that is no update")]
    UpdatePrevNotUpdate,

    #[error("name too long")]
    NameTooLong,

    #[error("value too long")]
    ValueTooLong,

    #[error("rand too large")]
    RandTooLong,

    /// An input's coin could not be fetched from the view.
    #[error("failed to fetch input coin {0}")]
    MissingInput(OutPoint),

    /// The view itself failed.
    #[error(transparent)]
    State(#[from] nmc_state::Error),
}
