//! The presigning and signing protocols as chains of rounds.

mod common;
pub(crate) mod presigning;
pub(crate) mod signing;

use std::collections::{BTreeMap, BTreeSet};

use rand_core::CryptoRngCore;

pub(crate) use common::Context;
use presigning::{AbortRound1, PresignRound1, PresignRound2, PresignRound3, PresignRound4};
use signing::{AbortRound2, SignRound1, SignRound2};

use crate::{
    entities::PartyId,
    params::SchemeParams,
    rounds::{finalize_round, verify_round_message, DynPayload, FinalizeError, Outgoing, ReceiveError, Round},
    sessions::{Failure, LocalError, SessionOutput},
};

/// The current state of a party's protocol execution.
pub(crate) enum Stage<P: SchemeParams> {
    Presign1(PresignRound1<P>),
    Presign2(PresignRound2<P>),
    Presign3(PresignRound3<P>),
    Presign4(PresignRound4<P>),
    Abort1(AbortRound1<P>),
    Sign1(SignRound1<P>),
    Sign2(SignRound2<P>),
    Abort2(AbortRound2<P>),
    Success(SessionOutput<P>),
    Failure(Failure),
}

macro_rules! dispatch {
    ($stage:expr, $round:ident => $body:expr, _ => $terminal:expr) => {
        match $stage {
            Stage::Presign1($round) => $body,
            Stage::Presign2($round) => $body,
            Stage::Presign3($round) => $body,
            Stage::Presign4($round) => $body,
            Stage::Abort1($round) => $body,
            Stage::Sign1($round) => $body,
            Stage::Sign2($round) => $body,
            Stage::Abort2($round) => $body,
            Stage::Success(_) | Stage::Failure(_) => $terminal,
        }
    };
}

fn round_num<P: SchemeParams, R: Round<P>>(_round: &R) -> u8 {
    R::ROUND_NUM
}

fn next_round_nums<P: SchemeParams, R: Round<P>>(_round: &R) -> &'static [u8] {
    R::NEXT_ROUND_NUMS
}

fn expected_parts<P: SchemeParams, R: Round<P>>(_round: &R) -> (bool, bool) {
    (R::EXPECTS_BROADCAST, R::EXPECTS_DIRECT)
}

fn terminated() -> LocalError {
    LocalError::new("The protocol has already terminated")
}

impl<P: SchemeParams> Stage<P> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failure(_))
    }

    /// The number of the round, or `None` for terminal stages.
    pub fn round_num(&self) -> Option<u8> {
        dispatch!(self, round => Some(round_num::<P, _>(round)), _ => None)
    }

    pub fn next_round_nums(&self) -> &'static [u8] {
        dispatch!(self, round => next_round_nums::<P, _>(round), _ => &[])
    }

    /// Whether the round expects a broadcast part and a direct part from each sender.
    pub fn expected_parts(&self) -> (bool, bool) {
        dispatch!(self, round => expected_parts::<P, _>(round), _ => (false, false))
    }

    pub fn expecting_messages_from(&self) -> BTreeSet<PartyId> {
        dispatch!(self, round => round.expecting_messages_from().clone(), _ => BTreeSet::new())
    }

    pub fn verify_message(
        &self,
        from: &PartyId,
        broadcast: Option<&[u8]>,
        direct: Option<&[u8]>,
    ) -> Result<DynPayload, ReceiveError> {
        dispatch!(
            self,
            round => verify_round_message::<P, _>(round, from, broadcast, direct),
            _ => Err(ReceiveError::Local(terminated()))
        )
    }

    pub fn finalize(
        self,
        rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, DynPayload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError> {
        dispatch!(
            self,
            round => finalize_round::<P, _>(round, rng, payloads),
            _ => Err(FinalizeError::Local(terminated()))
        )
    }
}

impl<P: SchemeParams> core::fmt::Debug for Stage<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Success(_) => write!(f, "Stage::Success"),
            Self::Failure(failure) => write!(f, "Stage::Failure({failure})"),
            _ => write!(f, "Stage::Round({:?})", self.round_num()),
        }
    }
}
