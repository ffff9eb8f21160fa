use std::collections::{BTreeMap, BTreeSet};

use digest::{ExtendableOutput, Update, XofReader};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use serde_encoded_bytes::{Base64, Hex, SliceLike};
use sha3::Shake256;
use tracing::{debug, info, trace, warn};

use super::error::{Error, Failure, LocalError, RemoteError};
use crate::{
    curve::{RecoverableSignature, Scalar},
    entities::{PartyId, PreSignature, ThresholdKeyShare},
    params::SchemeParams,
    protocols::{presigning::PresignRound1, signing::SignRound1, Context, Stage},
    rounds::{DynPayload, FinalizeError, Outgoing, ReceiveError},
};

const SESSION_ID_TAG: &[u8] = b"session-id";

/// A session identifier shared by all the participants.
///
/// Must be unique for each protocol execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(#[serde(with = "SliceLike::<Hex>")] [u8; 32]);

impl SessionId {
    /// Derives a session identifier from shared randomness.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut digest = Shake256::default();
        digest.update(&(SESSION_ID_TAG.len() as u64).to_be_bytes());
        digest.update(SESSION_ID_TAG);
        digest.update(seed);
        let mut bytes = [0u8; 32];
        digest.finalize_xof().read(&mut bytes);
        Self(bytes)
    }

    /// The identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A message to be delivered by the transport.
///
/// If [`Envelope::to`] is `None`, the message is a broadcast and must be delivered to all the other participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    session_id: SessionId,
    round: u8,
    from: PartyId,
    to: Option<PartyId>,
    #[serde(with = "SliceLike::<Base64>")]
    content: Box<[u8]>,
}

impl Envelope {
    /// The session this message belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The round this message is addressed to.
    pub fn round(&self) -> u8 {
        self.round
    }

    /// The sender.
    pub fn from(&self) -> PartyId {
        self.from
    }

    /// The destination, or `None` for broadcasts.
    pub fn to(&self) -> Option<PartyId> {
        self.to
    }

    /// The serialized message.
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

fn envelopes(session_id: SessionId, from: PartyId, round: u8, outgoing: Outgoing) -> Vec<Envelope> {
    let broadcast = outgoing.broadcast.into_iter().map(|content| Envelope {
        session_id,
        round,
        from,
        to: None,
        content: content.into(),
    });
    let direct = outgoing.direct.into_iter().map(|(to, content)| Envelope {
        session_id,
        round,
        from,
        to: Some(to),
        content: content.into(),
    });
    broadcast.chain(direct).collect()
}

/// The result of a successful protocol execution.
#[derive(Debug, Clone)]
pub enum SessionOutput<P: SchemeParams> {
    /// A presignature, to be used later in [`Session::sign`].
    PreSignature(PreSignature<P>),
    /// A signature of the message.
    Signature(RecoverableSignature),
}

/// The result of finalizing a round.
#[derive(Debug)]
pub enum SessionOutcome<P: SchemeParams> {
    /// The protocol continues.
    AnotherRound {
        /// The session in the new round.
        session: Session<P>,
        /// The messages to send.
        messages: Vec<Envelope>,
        /// The messages for the new round received before it started.
        /// They must be passed to [`Session::receive`].
        cached_messages: Vec<Envelope>,
    },
    /// The protocol finished successfully.
    Success(SessionOutput<P>),
    /// The protocol finished with some parties identified as misbehaving.
    Failure(Failure),
}

#[derive(Debug, Default)]
struct MessageParts {
    broadcast: Option<Box<[u8]>>,
    direct: Option<Box<[u8]>>,
}

/// A party's state in a protocol execution.
#[derive(Debug)]
pub struct Session<P: SchemeParams> {
    session_id: SessionId,
    my_id: PartyId,
    round: u8,
    stage: Stage<P>,
    parts: BTreeMap<PartyId, MessageParts>,
    payloads: BTreeMap<PartyId, DynPayload>,
    cached: BTreeMap<u8, Vec<Envelope>>,
}

fn receive_error(from: PartyId, error: ReceiveError) -> Error {
    match error {
        ReceiveError::Deserialization(message) => {
            Error::Structural(format!("Cannot deserialize the message from {from}: {message}"))
        }
        ReceiveError::InvalidMessage(message) => Error::Remote {
            party: from,
            error: RemoteError::InvalidMessage(message),
        },
        ReceiveError::Local(error) => Error::Local(error),
    }
}

fn finalize_error(error: FinalizeError) -> Error {
    match error {
        FinalizeError::MissingMessages(ids) => {
            Error::Local(LocalError::new(format!("Cannot finalize, messages from {ids:?} are missing")))
        }
        FinalizeError::Local(error) => Error::Local(error),
    }
}

/// Finalizes the stages that do not expect any messages,
/// collecting the messages produced along the way.
fn advance<P: SchemeParams>(
    rng: &mut impl CryptoRngCore,
    session_id: SessionId,
    my_id: PartyId,
    stage: Stage<P>,
    outgoing: Outgoing,
) -> Result<(Stage<P>, Vec<Envelope>), Error> {
    let mut stage = stage;
    let mut outgoing = outgoing;
    let mut messages = Vec::new();
    loop {
        if let Some(round) = stage.round_num() {
            messages.extend(envelopes(session_id, my_id, round, outgoing));
        }
        if stage.is_terminal() || !stage.expecting_messages_from().is_empty() {
            break;
        }
        (stage, outgoing) = stage.finalize(rng, BTreeMap::new()).map_err(finalize_error)?;
    }
    Ok((stage, messages))
}

impl<P: SchemeParams> Session<P> {
    /// Starts presigning with the given set of signers.
    ///
    /// If `message` is given, the session continues into signing it
    /// and the outcome is a signature instead of a presignature.
    pub fn presign(
        rng: &mut impl CryptoRngCore,
        session_id: SessionId,
        key_share: &ThresholdKeyShare<P>,
        signers: &BTreeSet<PartyId>,
        message: Option<Scalar>,
    ) -> Result<(Self, Vec<Envelope>), Error> {
        if signers.len() < 2 {
            return Err(LocalError::new("At least two signers are required").into());
        }
        key_share.verify_aux_info(signers)?;
        let context = Context::new(session_id, key_share.to_key_share(signers)?);
        let round = PresignRound1::new(rng, context, message)?;
        Self::start(rng, session_id, *key_share.owner(), Stage::Presign1(round))
    }

    /// Starts signing `message` (a prehashed digest) with a presignature.
    ///
    /// The signers are the ones that created the presignature.
    pub fn sign(
        rng: &mut impl CryptoRngCore,
        session_id: SessionId,
        key_share: &ThresholdKeyShare<P>,
        presignature: PreSignature<P>,
        message: Scalar,
    ) -> Result<(Self, Vec<Envelope>), Error> {
        if presignature.record.owner != *key_share.owner() {
            return Err(LocalError::new("The presignature belongs to another party").into());
        }
        let signers = presignature.signers();
        if signers.len() < 2 {
            return Err(LocalError::new("At least two signers are required").into());
        }
        key_share.verify_aux_info(&signers)?;
        let context = Context::new(session_id, key_share.to_key_share(&signers)?);
        let round = SignRound1::new(context, presignature, message);
        Self::start(rng, session_id, *key_share.owner(), Stage::Sign1(round))
    }

    fn start(
        rng: &mut impl CryptoRngCore,
        session_id: SessionId,
        my_id: PartyId,
        stage: Stage<P>,
    ) -> Result<(Self, Vec<Envelope>), Error> {
        let (stage, messages) = advance(rng, session_id, my_id, stage, Outgoing::none())?;
        let session = Self::new_round(session_id, my_id, stage, BTreeMap::new())?;
        Ok((session, messages))
    }

    fn new_round(
        session_id: SessionId,
        my_id: PartyId,
        stage: Stage<P>,
        cached: BTreeMap<u8, Vec<Envelope>>,
    ) -> Result<Self, LocalError> {
        let round = stage
            .round_num()
            .ok_or_else(|| LocalError::new("The protocol has already terminated"))?;
        info!("{my_id}: entering round {round}");
        Ok(Self {
            session_id,
            my_id,
            round,
            stage,
            parts: BTreeMap::new(),
            payloads: BTreeMap::new(),
            cached,
        })
    }

    /// The session identifier.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The identifier of the party running this session.
    pub fn my_id(&self) -> &PartyId {
        &self.my_id
    }

    /// The number of the current round.
    pub fn current_round(&self) -> u8 {
        self.round
    }

    /// Returns `true` if messages from all the expected parties have been received.
    pub fn can_finalize(&self) -> bool {
        self.missing_messages().is_empty()
    }

    /// The parties whose messages for the current round have not been received yet.
    pub fn missing_messages(&self) -> BTreeSet<PartyId> {
        self.stage
            .expecting_messages_from()
            .into_iter()
            .filter(|id| !self.payloads.contains_key(id))
            .collect()
    }

    /// Processes a message from another party.
    ///
    /// Messages for the next round are stored and returned by [`Session::finalize`].
    /// An error does not invalidate the session.
    pub fn receive(&mut self, envelope: Envelope) -> Result<(), Error> {
        if envelope.session_id != self.session_id {
            return Err(Error::Structural("The message belongs to another session".into()));
        }
        if envelope.to.is_some_and(|to| to != self.my_id) {
            return Err(Error::Structural("The message is addressed to another party".into()));
        }
        if envelope.from == self.my_id {
            return Err(LocalError::new("Cannot take a message from myself").into());
        }

        if envelope.round == self.round {
            self.receive_current(envelope)
        } else if self.stage.next_round_nums().contains(&envelope.round) {
            self.cache(envelope)
        } else {
            Err(Error::Remote {
                party: envelope.from,
                error: RemoteError::OutOfRoundMessage,
            })
        }
    }

    fn receive_current(&mut self, envelope: Envelope) -> Result<(), Error> {
        let from = envelope.from;
        let remote = |error| Error::Remote { party: from, error };

        if !self.stage.expecting_messages_from().contains(&from) {
            return Err(remote(RemoteError::UnexpectedSender));
        }
        if self.payloads.contains_key(&from) {
            return Err(remote(RemoteError::DuplicateMessage));
        }

        let (expects_broadcast, expects_direct) = self.stage.expected_parts();
        let parts = self.parts.entry(from).or_default();
        let slot = match envelope.to {
            Some(_) if expects_direct => &mut parts.direct,
            None if expects_broadcast => &mut parts.broadcast,
            _ => {
                return Err(remote(RemoteError::InvalidMessage(
                    "The round does not expect a message of this type".into(),
                )))
            }
        };
        if slot.is_some() {
            return Err(remote(RemoteError::DuplicateMessage));
        }
        *slot = Some(envelope.content);

        let complete = (parts.broadcast.is_some() || !expects_broadcast) && (parts.direct.is_some() || !expects_direct);
        if !complete {
            trace!("{}: waiting for the rest of the message from {from}", self.my_id);
            return Ok(());
        }

        match self
            .stage
            .verify_message(&from, parts.broadcast.as_deref(), parts.direct.as_deref())
        {
            Ok(payload) => {
                debug!("{}: accepted a message from {from} in round {}", self.my_id, self.round);
                self.payloads.insert(from, payload);
                Ok(())
            }
            Err(error) => {
                warn!("{}: rejected a message from {from} in round {}: {error}", self.my_id, self.round);
                Err(receive_error(from, error))
            }
        }
    }

    fn cache(&mut self, envelope: Envelope) -> Result<(), Error> {
        let cached = self.cached.entry(envelope.round).or_default();
        let duplicate = cached
            .iter()
            .any(|other| other.from == envelope.from && other.to.is_some() == envelope.to.is_some());
        if duplicate {
            return Err(Error::Remote {
                party: envelope.from,
                error: RemoteError::DuplicateMessage,
            });
        }
        trace!("{}: cached a message from {} for round {}", self.my_id, envelope.from, envelope.round);
        cached.push(envelope);
        Ok(())
    }

    /// Finishes the current round.
    pub fn finalize(self, rng: &mut impl CryptoRngCore) -> Result<SessionOutcome<P>, Error> {
        let missing = self.missing_messages();
        if !missing.is_empty() {
            return Err(finalize_error(FinalizeError::MissingMessages(missing)));
        }

        let Self {
            session_id,
            my_id,
            stage,
            payloads,
            mut cached,
            ..
        } = self;

        let (stage, outgoing) = stage.finalize(rng, payloads).map_err(finalize_error)?;
        let (stage, messages) = advance(rng, session_id, my_id, stage, outgoing)?;

        match stage {
            Stage::Success(output) => {
                info!("{my_id}: the protocol finished successfully");
                Ok(SessionOutcome::Success(output))
            }
            Stage::Failure(failure) => {
                warn!("{my_id}: the protocol failed: {failure}");
                Ok(SessionOutcome::Failure(failure))
            }
            stage => {
                let round = stage.round_num();
                let cached_messages = round.and_then(|round| cached.remove(&round)).unwrap_or_default();
                let next_rounds = stage.next_round_nums();
                cached.retain(|round, _| next_rounds.contains(round));

                let session = Self::new_round(session_id, my_id, stage, cached)?;
                Ok(SessionOutcome::AnotherRound {
                    session,
                    messages,
                    cached_messages,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use rand_core::OsRng;

    use super::{Envelope, Session, SessionId, SessionOutcome};
    use crate::{
        centralized_keygen::make_key_shares,
        entities::PartyId,
        params::TestParams,
        protocols::Stage,
        sessions::{AbortKind, Error, RemoteError},
    };

    type Sessions = BTreeMap<PartyId, Session<TestParams>>;

    fn deliver(sessions: &mut Sessions, messages: Vec<Envelope>) {
        for message in messages {
            for (id, session) in sessions.iter_mut() {
                if *id != message.from() && message.to().map_or(true, |to| to == *id) {
                    session.receive(message.clone()).unwrap();
                }
            }
        }
    }

    /// Finalizes every session, separating the ones that terminated.
    fn finalize_all(
        sessions: Sessions,
    ) -> (Sessions, Vec<Envelope>, BTreeMap<PartyId, SessionOutcome<TestParams>>) {
        let mut next_sessions = BTreeMap::new();
        let mut messages = Vec::new();
        let mut terminated = BTreeMap::new();
        for (id, session) in sessions {
            match session.finalize(&mut OsRng).unwrap() {
                SessionOutcome::AnotherRound {
                    mut session,
                    messages: new_messages,
                    cached_messages,
                } => {
                    for message in cached_messages {
                        session.receive(message).unwrap();
                    }
                    messages.extend(new_messages);
                    next_sessions.insert(id, session);
                }
                outcome => {
                    terminated.insert(id, outcome);
                }
            }
        }
        (next_sessions, messages, terminated)
    }

    #[test]
    fn session_id_from_seed() {
        assert_eq!(SessionId::from_seed(b"abc"), SessionId::from_seed(b"abc"));
        assert_ne!(SessionId::from_seed(b"abc"), SessionId::from_seed(b"abd"));
    }

    #[test_log::test]
    fn message_routing() {
        let id1 = PartyId::new(1);
        let id2 = PartyId::new(2);
        let ids = BTreeSet::from([id1, id2]);
        let shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
        let session_id = SessionId::from_seed(b"routing");

        let (mut session1, messages1) =
            Session::presign(&mut OsRng, session_id, &shares[&id1], &ids, None).unwrap();
        let (mut session2, messages2) =
            Session::presign(&mut OsRng, session_id, &shares[&id2], &ids, None).unwrap();
        assert_eq!(session1.current_round(), 2);
        assert_eq!(session1.missing_messages(), BTreeSet::from([id2]));

        // One broadcast and one direct message each
        assert_eq!(messages2.len(), 2);
        let broadcast = messages2.iter().find(|message| message.to().is_none()).unwrap().clone();
        let direct = messages2.iter().find(|message| message.to().is_some()).unwrap().clone();

        let mut wrong_session = broadcast.clone();
        wrong_session.session_id = SessionId::from_seed(b"other");
        assert!(matches!(session1.receive(wrong_session), Err(Error::Structural(_))));

        let mut wrong_destination = direct.clone();
        wrong_destination.to = Some(PartyId::new(3));
        assert!(matches!(session1.receive(wrong_destination), Err(Error::Structural(_))));

        let mut out_of_round = broadcast.clone();
        out_of_round.round = 6;
        assert!(matches!(
            session1.receive(out_of_round),
            Err(Error::Remote {
                error: RemoteError::OutOfRoundMessage,
                ..
            })
        ));

        session1.receive(direct.clone()).unwrap();
        assert!(!session1.can_finalize());
        assert!(matches!(
            session1.receive(direct),
            Err(Error::Remote {
                error: RemoteError::DuplicateMessage,
                ..
            })
        ));
        session1.receive(broadcast).unwrap();
        assert!(session1.can_finalize());

        // Cannot finalize without the messages from party 1
        assert!(!session2.can_finalize());
        for message in messages1 {
            session2.receive(message).unwrap();
        }

        // Party 1 gets ahead, its round 3 messages are cached by party 2
        let (session1, messages1) = match session1.finalize(&mut OsRng).unwrap() {
            SessionOutcome::AnotherRound {
                session,
                messages,
                cached_messages,
            } => {
                assert!(cached_messages.is_empty());
                (session, messages)
            }
            _ => panic!("Expected another round"),
        };
        assert_eq!(session1.current_round(), 3);
        for message in messages1.clone() {
            session2.receive(message).unwrap();
        }
        assert!(matches!(
            session2.receive(messages1[0].clone()),
            Err(Error::Remote {
                error: RemoteError::DuplicateMessage,
                ..
            })
        ));

        match session2.finalize(&mut OsRng).unwrap() {
            SessionOutcome::AnotherRound {
                session,
                cached_messages,
                ..
            } => {
                assert_eq!(session.current_round(), 3);
                assert_eq!(cached_messages.len(), messages1.len());
            }
            _ => panic!("Expected another round"),
        }
    }

    #[test_log::test]
    fn presigning_failure_names_the_culprit() {
        let ids = (1..=3).map(PartyId::new).collect::<BTreeSet<_>>();
        let shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
        let session_id = SessionId::from_seed(b"failure");

        let mut sessions = BTreeMap::new();
        let mut messages = Vec::new();
        for id in ids.iter() {
            let (session, new_messages) = Session::presign(&mut OsRng, session_id, &shares[id], &ids, None).unwrap();
            sessions.insert(*id, session);
            messages.extend(new_messages);
        }

        // Rounds 2 and 3
        for _ in 0..2 {
            deliver(&mut sessions, messages);
            let (next_sessions, next_messages, terminated) = finalize_all(sessions);
            assert!(terminated.is_empty());
            sessions = next_sessions;
            messages = next_messages;
        }

        let cheater = PartyId::new(2);
        let session = sessions.get_mut(&cheater).unwrap();
        assert_eq!(session.current_round(), 4);
        let round = match &mut session.stage {
            Stage::Presign4(round) => round,
            other => panic!("Unexpected stage: {other:?}"),
        };
        let broadcast = messages
            .iter_mut()
            .find(|message| message.from() == cheater && message.to().is_none())
            .unwrap();
        broadcast.content = round.shift_delta(&broadcast.content).into();

        // Round 4 fails the consistency check, everyone enters round 5
        deliver(&mut sessions, messages);
        let (mut sessions, messages, terminated) = finalize_all(sessions);
        assert!(terminated.is_empty());
        assert!(sessions.values().all(|session| session.current_round() == 5));

        deliver(&mut sessions, messages);
        let (sessions, _messages, terminated) = finalize_all(sessions);
        assert!(sessions.is_empty());
        assert_eq!(terminated.len(), 3);
        for outcome in terminated.into_values() {
            match outcome {
                SessionOutcome::Failure(failure) => {
                    assert_eq!(failure.kind(), AbortKind::Presigning);
                    assert_eq!(failure.culprits(), &[cheater]);
                }
                _ => panic!("Expected a failure"),
            }
        }
    }

    #[test]
    fn not_enough_signers() {
        let id1 = PartyId::new(1);
        let ids = BTreeSet::from([id1, PartyId::new(2)]);
        let shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 1, None).unwrap();
        let result = Session::presign(
            &mut OsRng,
            SessionId::from_seed(b"single"),
            &shares[&id1],
            &BTreeSet::from([id1]),
            None,
        );
        assert!(matches!(result, Err(Error::Local(_))));
    }
}
