// TODO: Remove as soon as https://github.com/yaahc/displaydoc/pull/47
// lands and displaydoc releases a new version
#![allow(non_local_definitions)]

use core::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use displaydoc::Display;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{entities::PartyId, params::SchemeParams, protocols::Stage, sessions::LocalError};

/// A single round of a protocol.
///
/// The messages a round receives are produced by the `finalize()` of the previous round.
pub(crate) trait Round<P: SchemeParams>: 'static + Sized + Send {
    const ROUND_NUM: u8;
    /// The rounds the protocol may go to after this one.
    ///
    /// Messages for these rounds can arrive before this round is finalized.
    const NEXT_ROUND_NUMS: &'static [u8];

    /// Whether each sender is expected to send a broadcast part.
    const EXPECTS_BROADCAST: bool;
    /// Whether each sender is expected to send a direct part.
    const EXPECTS_DIRECT: bool;

    /// The part of the message that is the same for each destination node.
    type BroadcastMessage: Serialize + for<'de> Deserialize<'de>;
    /// The part of the message sent directly to nodes, and can be different for each node.
    type DirectMessage: Serialize + for<'de> Deserialize<'de>;
    /// The processed message from another node, to be collected to finalize the round.
    type Payload: 'static + Send;

    fn expecting_messages_from(&self) -> &BTreeSet<PartyId>;

    fn verify_message(
        &self,
        from: &PartyId,
        broadcast: Self::BroadcastMessage,
        direct: Self::DirectMessage,
    ) -> Result<Self::Payload, ReceiveError>;

    /// Consumes the round and returns the next stage along with the messages for it.
    fn finalize(
        self,
        rng: &mut impl CryptoRngCore,
        payloads: BTreeMap<PartyId, Self::Payload>,
    ) -> Result<(Stage<P>, Outgoing), FinalizeError>;
}

static NO_PARTIES: BTreeSet<PartyId> = BTreeSet::new();

/// For rounds that do not expect any messages.
pub(crate) fn no_parties() -> &'static BTreeSet<PartyId> {
    &NO_PARTIES
}

/// Errors when verifying a message from a specific party.
#[derive(Debug, Clone, Display)]
pub(crate) enum ReceiveError {
    /// Cannot deserialize the message: {0}
    Deserialization(String),
    /// Invalid message: {0}
    InvalidMessage(String),
    /// Local error: {0}
    Local(LocalError),
}

impl From<LocalError> for ReceiveError {
    fn from(error: LocalError) -> Self {
        Self::Local(error)
    }
}

impl ReceiveError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}

/// Errors when finalizing a round.
#[derive(Debug, Clone, Display)]
pub(crate) enum FinalizeError {
    /// Not all of the expected messages have been received (missing: {0:?})
    MissingMessages(BTreeSet<PartyId>),
    /// Local error: {0}
    Local(LocalError),
}

impl From<LocalError> for FinalizeError {
    fn from(error: LocalError) -> Self {
        Self::Local(error)
    }
}

/// Serialized messages produced when finalizing a round.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outgoing {
    pub broadcast: Option<Vec<u8>>,
    pub direct: BTreeMap<PartyId, Vec<u8>>,
}

impl Outgoing {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_broadcast(mut self, message: &impl Serialize) -> Result<Self, LocalError> {
        self.broadcast = Some(serialize_message(message)?);
        Ok(self)
    }

    pub fn with_direct(mut self, destination: PartyId, message: &impl Serialize) -> Result<Self, LocalError> {
        self.direct.insert(destination, serialize_message(message)?);
        Ok(self)
    }
}

fn serialize_message(message: &impl Serialize) -> Result<Vec<u8>, LocalError> {
    bincode::serialize(message).map_err(|err| LocalError::new(format!("Failed to serialize: {err:?}")))
}

fn deserialize_part<M: for<'de> Deserialize<'de>>(expected: bool, bytes: Option<&[u8]>) -> Result<M, ReceiveError> {
    match (expected, bytes) {
        (true, Some(bytes)) => bincode::deserialize(bytes).map_err(|err| ReceiveError::Deserialization(err.to_string())),
        // The unit type deserializes from an empty buffer.
        (false, None) => bincode::deserialize(&[]).map_err(|err| ReceiveError::Deserialization(err.to_string())),
        (true, None) => Err(ReceiveError::Deserialization("A required message part is missing".into())),
        (false, Some(_)) => Err(ReceiveError::Deserialization("Unexpected message part".into())),
    }
}

/// A type-erased round payload.
pub(crate) struct DynPayload(Box<dyn Any + Send>);

impl DynPayload {
    fn new<T: 'static + Send>(payload: T) -> Self {
        Self(Box::new(payload))
    }

    fn downcast<T: 'static>(self) -> Result<T, LocalError> {
        self.0
            .downcast::<T>()
            .map(|payload| *payload)
            .map_err(|_| LocalError::new(format!("Failed to downcast into {}", core::any::type_name::<T>())))
    }
}

impl core::fmt::Debug for DynPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "DynPayload")
    }
}

/// Deserializes the message parts and verifies them with the given round.
pub(crate) fn verify_round_message<P: SchemeParams, R: Round<P>>(
    round: &R,
    from: &PartyId,
    broadcast: Option<&[u8]>,
    direct: Option<&[u8]>,
) -> Result<DynPayload, ReceiveError> {
    if !round.expecting_messages_from().contains(from) {
        return Err(ReceiveError::invalid(format!(
            "Round {} does not expect messages from {from}",
            R::ROUND_NUM
        )));
    }
    let broadcast = deserialize_part::<R::BroadcastMessage>(R::EXPECTS_BROADCAST, broadcast)?;
    let direct = deserialize_part::<R::DirectMessage>(R::EXPECTS_DIRECT, direct)?;
    round.verify_message(from, broadcast, direct).map(DynPayload::new)
}

/// Checks that all the expected payloads are present and finalizes the round.
pub(crate) fn finalize_round<P: SchemeParams, R: Round<P>>(
    round: R,
    rng: &mut impl CryptoRngCore,
    payloads: BTreeMap<PartyId, DynPayload>,
) -> Result<(Stage<P>, Outgoing), FinalizeError> {
    let missing = round
        .expecting_messages_from()
        .iter()
        .filter(|id| !payloads.contains_key(id))
        .cloned()
        .collect::<BTreeSet<_>>();
    if !missing.is_empty() {
        return Err(FinalizeError::MissingMessages(missing));
    }

    let payloads = payloads
        .into_iter()
        .map(|(id, payload)| Ok((id, payload.downcast::<R::Payload>()?)))
        .collect::<Result<BTreeMap<_, _>, LocalError>>()?;

    round.finalize(rng, payloads)
}

#[cfg(test)]
mod tests {
    use super::{deserialize_part, DynPayload, Outgoing, ReceiveError};
    use crate::entities::PartyId;

    #[test]
    fn message_parts() {
        assert!(deserialize_part::<()>(false, None).is_ok());
        assert!(matches!(
            deserialize_part::<()>(false, Some(&[1])),
            Err(ReceiveError::Deserialization(_))
        ));
        assert!(matches!(
            deserialize_part::<u32>(true, None),
            Err(ReceiveError::Deserialization(_))
        ));

        let outgoing = Outgoing::none()
            .with_broadcast(&7u32)
            .unwrap()
            .with_direct(PartyId::new(1), &8u64)
            .unwrap();
        let broadcast = outgoing.broadcast.as_deref();
        assert_eq!(deserialize_part::<u32>(true, broadcast).unwrap(), 7);
        let direct = outgoing.direct.get(&PartyId::new(1)).map(|bytes| bytes.as_slice());
        assert_eq!(deserialize_part::<u64>(true, direct).unwrap(), 8);
    }

    #[test]
    fn payload_downcast() {
        assert_eq!(DynPayload::new(5u8).downcast::<u8>().unwrap(), 5);
        assert!(DynPayload::new(5u8).downcast::<u16>().is_err());
    }
}
