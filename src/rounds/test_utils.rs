use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand_core::CryptoRngCore;

use super::{FinalizeError, Outgoing, ReceiveError};
use crate::{entities::PartyId, params::SchemeParams, protocols::Stage};

/// A party's current stage and the messages it produced when entering it.
pub(crate) type Party<P> = (Stage<P>, Outgoing);

#[derive(Debug)]
pub(crate) enum StepError {
    Receive {
        from: PartyId,
        to: PartyId,
        error: ReceiveError,
    },
    Finalize {
        party: PartyId,
        error: FinalizeError,
    },
}

/// Delivers the messages of every party to their destinations in a shuffled order,
/// and finalizes every round.
///
/// Parties in terminal stages are passed through.
pub(crate) fn step<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    parties: BTreeMap<PartyId, Party<P>>,
) -> Result<BTreeMap<PartyId, Party<P>>, StepError> {
    let outgoing = parties
        .iter()
        .map(|(id, (_stage, outgoing))| (*id, outgoing.clone()))
        .collect::<BTreeMap<_, _>>();

    let mut result = BTreeMap::new();
    for (id, (stage, _outgoing)) in parties {
        if stage.is_terminal() {
            result.insert(id, (stage, Outgoing::none()));
            continue;
        }

        let mut senders = stage.expecting_messages_from().into_iter().collect::<Vec<_>>();
        senders.shuffle(rng);

        let mut payloads = BTreeMap::new();
        for from in senders {
            let message = outgoing.get(&from);
            let broadcast = message.and_then(|message| message.broadcast.as_deref());
            let direct = message
                .and_then(|message| message.direct.get(&id))
                .map(|bytes| bytes.as_slice());
            let payload = stage
                .verify_message(&from, broadcast, direct)
                .map_err(|error| StepError::Receive { from, to: id, error })?;
            payloads.insert(from, payload);
        }

        let next = stage
            .finalize(rng, payloads)
            .map_err(|error| StepError::Finalize { party: id, error })?;
        result.insert(id, next);
    }

    Ok(result)
}

/// Steps the parties until all of them reach a terminal stage.
pub(crate) fn run_to_end<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    parties: BTreeMap<PartyId, Party<P>>,
) -> Result<BTreeMap<PartyId, Stage<P>>, StepError> {
    let mut parties = parties;
    while !parties.values().all(|(stage, _outgoing)| stage.is_terminal()) {
        parties = step(rng, parties)?;
    }
    Ok(parties.into_iter().map(|(id, (stage, _outgoing))| (id, stage)).collect())
}
