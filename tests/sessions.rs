use std::collections::{BTreeMap, BTreeSet};

use k256::ecdsa::{signature::hazmat::PrehashVerifier, SigningKey};
use rand::Rng;
use rand_core::OsRng;

use threshold_presign::{
    make_key_shares, Envelope, Error, PartyId, Point, PreSignature, RecoverableSignature, RemoteError, Scalar, Session,
    SessionId, SessionOutcome, SessionOutput, TestParams, ThresholdKeyShare,
};

fn make_ids(num_parties: u32) -> BTreeSet<PartyId> {
    (1..=num_parties).map(PartyId::new).collect()
}

fn id_to_str(id: &PartyId) -> String {
    format!("party {}", id.as_u32())
}

/// Runs the sessions to completion, delivering the messages in random order.
fn run_nodes(
    sessions: BTreeMap<PartyId, Session<TestParams>>,
    messages: Vec<Envelope>,
) -> BTreeMap<PartyId, SessionOutput<TestParams>> {
    let mut sessions = sessions;
    let mut queue = messages;
    let mut results = BTreeMap::new();

    while !sessions.is_empty() {
        // Deliver everything that is in flight, in random order
        while !queue.is_empty() {
            let message_idx = OsRng.gen_range(0..queue.len());
            let message = queue.swap_remove(message_idx);
            let destinations = match message.to() {
                Some(to) => vec![to],
                None => sessions.keys().filter(|id| **id != message.from()).cloned().collect(),
            };
            for id_to in destinations {
                if let Some(session) = sessions.get_mut(&id_to) {
                    println!(
                        "{}: receiving a message from {} for round {}",
                        id_to_str(&id_to),
                        id_to_str(&message.from()),
                        message.round()
                    );
                    session.receive(message.clone()).unwrap();
                }
            }
        }

        let ready = sessions
            .iter()
            .filter(|(_, session)| session.can_finalize())
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        assert!(!ready.is_empty(), "The execution is stuck");

        for id in ready {
            let session = sessions.remove(&id).unwrap();
            println!("{}: finalizing round {}", id_to_str(&id), session.current_round());
            match session.finalize(&mut OsRng).unwrap() {
                SessionOutcome::AnotherRound {
                    session,
                    messages,
                    cached_messages,
                } => {
                    queue.extend(messages);
                    let mut session = session;
                    for message in cached_messages {
                        session.receive(message).unwrap();
                    }
                    sessions.insert(id, session);
                }
                SessionOutcome::Success(output) => {
                    results.insert(id, output);
                }
                SessionOutcome::Failure(failure) => panic!("{}: unexpected failure: {failure}", id_to_str(&id)),
            }
        }
    }

    results
}

fn start_presigning(
    session_id: SessionId,
    key_shares: &BTreeMap<PartyId, ThresholdKeyShare<TestParams>>,
    signers: &BTreeSet<PartyId>,
    message: Option<Scalar>,
) -> (BTreeMap<PartyId, Session<TestParams>>, Vec<Envelope>) {
    let mut sessions = BTreeMap::new();
    let mut messages = Vec::new();
    for id in signers {
        let (session, session_messages) =
            Session::presign(&mut OsRng, session_id, &key_shares[id], signers, message).unwrap();
        sessions.insert(*id, session);
        messages.extend(session_messages);
    }
    (sessions, messages)
}

fn check_signature(
    signing_key: &SigningKey,
    key_shares: &BTreeMap<PartyId, ThresholdKeyShare<TestParams>>,
    prehash: &[u8; 32],
    outputs: BTreeMap<PartyId, SessionOutput<TestParams>>,
) {
    let signatures = outputs
        .into_values()
        .map(|output| match output {
            SessionOutput::Signature(signature) => signature,
            SessionOutput::PreSignature(_) => panic!("Expected a signature"),
        })
        .collect::<Vec<RecoverableSignature>>();

    let (signature, _recovery_id) = signatures[0].to_backend();
    for other in signatures.iter().skip(1) {
        assert_eq!(other.to_backend().0, signature);
    }

    for key_share in key_shares.values() {
        assert_eq!(&key_share.verifying_key().unwrap(), signing_key.verifying_key());
    }
    signing_key.verifying_key().verify_prehash(prehash, &signature).unwrap();
}

fn presign_then_sign(num_parties: u32, threshold: usize, signers: &BTreeSet<PartyId>) {
    let signing_key = SigningKey::random(&mut OsRng);
    let ids = make_ids(num_parties);
    let key_shares = make_key_shares::<TestParams>(&mut OsRng, &ids, threshold, Some(&signing_key)).unwrap();

    let signers = signers.clone();
    let session_id = SessionId::from_seed(b"presigning");
    let (sessions, messages) = start_presigning(session_id, &key_shares, &signers, None);
    let outputs = run_nodes(sessions, messages);

    let presignatures = outputs
        .into_iter()
        .map(|(id, output)| match output {
            SessionOutput::PreSignature(presignature) => (id, presignature),
            SessionOutput::Signature(_) => panic!("Expected a presignature"),
        })
        .collect::<BTreeMap<PartyId, PreSignature<TestParams>>>();

    let first = presignatures.values().next().unwrap();
    println!("Presignature id: {}", hex::encode(first.id()));
    assert_ne!(first.nonce(), Point::IDENTITY);
    for presignature in presignatures.values() {
        assert_eq!(presignature.id(), first.id());
        assert_eq!(presignature.nonce(), first.nonce());
        assert_eq!(presignature.signers(), signers);
    }

    let prehash: [u8; 32] = OsRng.gen();
    let message = Scalar::from_reduced_bytes(&prehash);

    let session_id = SessionId::from_seed(b"signing");
    let mut sessions = BTreeMap::new();
    let mut messages = Vec::new();
    for (id, presignature) in presignatures {
        let (session, session_messages) =
            Session::sign(&mut OsRng, session_id, &key_shares[&id], presignature, message).unwrap();
        assert_eq!(session.current_round(), 7);
        sessions.insert(id, session);
        messages.extend(session_messages);
    }

    let outputs = run_nodes(sessions, messages);
    assert_eq!(outputs.len(), signers.len());
    check_signature(&signing_key, &key_shares, &prehash, outputs);
}

#[test_log::test]
fn all_parties_presign_then_sign() {
    presign_then_sign(3, 2, &make_ids(3));
}

#[test_log::test]
fn threshold_subset_presigns_then_signs() {
    presign_then_sign(3, 2, &BTreeSet::from([PartyId::new(1), PartyId::new(3)]));
}

#[test_log::test]
fn presign_and_sign_in_one_session() {
    let signing_key = SigningKey::random(&mut OsRng);
    let ids = make_ids(3);
    let key_shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 3, Some(&signing_key)).unwrap();

    let prehash: [u8; 32] = OsRng.gen();
    let message = Scalar::from_reduced_bytes(&prehash);

    let session_id = SessionId::from_seed(b"presigning and signing");
    let (sessions, messages) = start_presigning(session_id, &key_shares, &ids, Some(message));
    let outputs = run_nodes(sessions, messages);
    assert_eq!(outputs.len(), 3);
    check_signature(&signing_key, &key_shares, &prehash, outputs);
}

#[test]
fn foreign_presignature_is_rejected() {
    let ids = make_ids(2);
    let key_shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
    let (sessions, messages) = start_presigning(SessionId::from_seed(b"presigning"), &key_shares, &ids, None);
    let mut outputs = run_nodes(sessions, messages);

    let presignature = match outputs.remove(&PartyId::new(1)).unwrap() {
        SessionOutput::PreSignature(presignature) => presignature,
        SessionOutput::Signature(_) => panic!("Expected a presignature"),
    };

    let result = Session::sign(
        &mut OsRng,
        SessionId::from_seed(b"signing"),
        &key_shares[&PartyId::new(2)],
        presignature,
        Scalar::from_reduced_bytes(&[1u8; 32]),
    );
    assert!(matches!(result, Err(Error::Local(_))));
}

#[test]
fn messages_from_non_signers_are_rejected() {
    let ids = make_ids(3);
    let key_shares = make_key_shares::<TestParams>(&mut OsRng, &ids, 2, None).unwrap();
    let signers = BTreeSet::from([PartyId::new(1), PartyId::new(2)]);
    let all_signers = make_ids(3);

    let session_id = SessionId::from_seed(b"presigning");
    let (mut sessions, _messages) = start_presigning(session_id, &key_shares, &signers, None);
    // Party 3 mistakenly believes it is signing too
    let (_session, outsider_messages) =
        Session::presign(&mut OsRng, session_id, &key_shares[&PartyId::new(3)], &all_signers, None).unwrap();

    let session = sessions.get_mut(&PartyId::new(1)).unwrap();
    let broadcast = outsider_messages
        .into_iter()
        .find(|message| message.to().is_none())
        .unwrap();
    assert!(matches!(
        session.receive(broadcast),
        Err(Error::Remote {
            error: RemoteError::UnexpectedSender,
            ..
        })
    ));
}
