// TODO: Remove as soon as https://github.com/yaahc/displaydoc/pull/47
// lands and displaydoc releases a new version
#![allow(non_local_definitions)]

use displaydoc::Display;
use serde::{Deserialize, Serialize};

use crate::entities::PartyId;

/// Possible errors returned by session methods.
#[derive(Clone, Debug, Display)]
pub enum Error {
    /// Local error: {0}
    Local(LocalError),
    /// A message that cannot be attributed to a party (wrong session or malformed envelope): {0}
    Structural(String),
    /// Party {party} sent an invalid message: {error}
    Remote {
        /// The party that sent the message.
        party: PartyId,
        /// The error that occurred.
        error: RemoteError,
    },
}

impl From<LocalError> for Error {
    fn from(error: LocalError) -> Self {
        Self::Local(error)
    }
}

/// An error on this party's side.
///
/// Can be caused by an incorrect usage, a bug in the implementation, or some environment error.
#[derive(Clone, Debug)]
pub struct LocalError(String);

impl core::fmt::Display for LocalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LocalError {
    /// Creates a new error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A fault of another party that can be attributed to it.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum RemoteError {
    /// The message belongs to a round that is neither the current nor one of the next ones
    OutOfRoundMessage,
    /// A message of this type from this party has already been received in this round
    DuplicateMessage,
    /// The party is not a participant of this round
    UnexpectedSender,
    /// The message contents are invalid: {0}
    InvalidMessage(String),
}

/// The stage at which an identifiable abort occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AbortKind {
    /// A peer sent an MtA ciphertext that decrypts to an out-of-range value
    Decryption,
    /// The presigning consistency check failed and the re-proving round found the culprits
    Presigning,
    /// The assembled signature did not verify and the re-proving round found the culprits
    Signing,
}

/// A protocol failure with a list of parties to blame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    kind: AbortKind,
    culprits: Vec<PartyId>,
}

impl Failure {
    pub(crate) fn new(kind: AbortKind, culprits: impl IntoIterator<Item = PartyId>) -> Self {
        let mut culprits = culprits.into_iter().collect::<Vec<_>>();
        culprits.sort();
        culprits.dedup();
        Self { kind, culprits }
    }

    /// Where the protocol failed.
    pub fn kind(&self) -> AbortKind {
        self.kind
    }

    /// The parties that misbehaved, sorted and deduplicated.
    pub fn culprits(&self) -> &[PartyId] {
        &self.culprits
    }
}

impl core::fmt::Display for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} failure, culprits: [", self.kind)?;
        for (i, party) in self.culprits.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{party}")?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for Error {}

impl std::error::Error for LocalError {}

impl std::error::Error for RemoteError {}
