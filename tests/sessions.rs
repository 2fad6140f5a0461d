//! End-to-end protocol runs driven through the public wire interface: every
//! message crosses the serialized wrapper exactly as it would on a real
//! transport, delivered in randomized order.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use apella::curve::{Ed25519, Point as _, Secp256k1};
use apella::ecdsa::{self, LocalPreParams};
use apella::k256;
use apella::num_bigint_dig::BigUint;
use apella::{
    eddsa, Error, ErrorKind, MessageRouting, Parameters, Party, PartyID, PeerContext,
    ReSharingParameters,
};

fn party_ids(keys: &[u64]) -> Vec<PartyID> {
    keys.iter()
        .map(|key| PartyID::new(format!("party-{key}"), format!("P{key}"), BigUint::from(*key)))
        .collect()
}

fn peer_context(keys: &[u64]) -> PeerContext {
    PeerContext::new(party_ids(keys)).unwrap()
}

fn session_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

type Tamper = dyn Fn(&MessageRouting, &mut Vec<u8>);

/// Drives a set of parties to completion, shuffling deliveries to exercise
/// the within-round commutativity guarantee. `tamper` may corrupt a message
/// before it is handed to the receivers.
fn run_with<Res>(
    mut parties: Vec<Party<Res>>,
    tamper: Option<&Tamper>,
) -> Result<Vec<Res>, Error> {
    let ids: Vec<PartyID> = parties.iter().map(|party| party.party_id().clone()).collect();

    let mut queue: Vec<(MessageRouting, Vec<u8>)> = Vec::new();
    for party in parties.iter_mut() {
        for outgoing in party.start(&mut OsRng)? {
            queue.push((outgoing.routing, outgoing.wire_bytes.into_vec()));
        }
    }

    while !queue.is_empty() {
        queue.shuffle(&mut rand::thread_rng());
        let (routing, mut bytes) = queue.pop().expect("checked non-empty");
        if let Some(tamper) = tamper {
            tamper(&routing, &mut bytes);
        }

        let recipients: Vec<PartyID> = match &routing.to {
            Some(recipients) => recipients.clone(),
            None => ids
                .iter()
                .filter(|id| **id != routing.from)
                .cloned()
                .collect(),
        };
        for recipient in recipients {
            let party = parties
                .iter_mut()
                .find(|party| party.party_id() == &recipient)
                .expect("recipient exists");
            let outgoing =
                party.update_from_bytes(&bytes, &routing.from, routing.is_broadcast, &mut OsRng)?;
            for message in outgoing {
                queue.push((message.routing, message.wire_bytes.into_vec()));
            }
        }
    }

    parties
        .into_iter()
        .map(|mut party| {
            assert!(party.is_finished());
            party.take_output().ok_or_else(|| {
                Error::configuration("a finished party did not produce an output")
            })
        })
        .collect()
}

fn run<Res>(parties: Vec<Party<Res>>) -> Result<Vec<Res>, Error> {
    run_with(parties, None)
}

/// Twelve unsafe-prime pre-params shared by every ECDSA test in this binary:
/// five for the keygen committee, seven for the resharing committee.
fn pre_params(index: usize) -> LocalPreParams {
    static CACHE: OnceLock<Vec<LocalPreParams>> = OnceLock::new();
    CACHE.get_or_init(|| {
        (0..12)
            .map(|_| LocalPreParams::generate_unsafe(&mut OsRng).unwrap())
            .collect()
    })[index]
        .clone()
}

const KEYGEN_KEYS: [u64; 5] = [1, 2, 3, 4, 5];
const KEYGEN_THRESHOLD: usize = 2;

/// One 2-of-5 ECDSA keygen per test binary; signing and resharing reuse it.
fn ecdsa_saves() -> &'static Vec<ecdsa::LocalSaveData> {
    static CACHE: OnceLock<Vec<ecdsa::LocalSaveData>> = OnceLock::new();
    CACHE.get_or_init(|| {
        let seed = session_seed();
        let peers = peer_context(&KEYGEN_KEYS);
        let parties = party_ids(&KEYGEN_KEYS)
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let params =
                    Parameters::new::<Secp256k1>(peers.clone(), id, KEYGEN_THRESHOLD).unwrap();
                ecdsa::keygen::new_party(&mut OsRng, params, Some(pre_params(i)), &seed).unwrap()
            })
            .collect();
        let saves = run(parties).unwrap();
        assert!(saves[1..]
            .iter()
            .all(|save| save.public_key() == saves[0].public_key()));
        saves
    })
}

fn sha256_reduced(message: &[u8]) -> BigUint {
    use apella::curve::Curve;
    BigUint::from_bytes_be(&Sha256::digest(message)) % Secp256k1::order()
}

fn ecdsa_sign(quorum_keys: &[u64], message_hash: &BigUint) -> Vec<apella::SignatureData> {
    let saves = ecdsa_saves();
    let seed = session_seed();
    let quorum = peer_context(quorum_keys);
    let parties = quorum_keys
        .iter()
        .map(|key| {
            let position = (*key - 1) as usize;
            let id = saves[position].self_id().clone();
            let params =
                Parameters::new::<Secp256k1>(quorum.clone(), id, KEYGEN_THRESHOLD).unwrap();
            ecdsa::signing::new_party(
                &mut OsRng,
                params,
                saves[position].clone(),
                message_hash,
                &seed,
            )
            .unwrap()
        })
        .collect();
    run(parties).unwrap()
}

fn verify_ecdsa_signature(
    public_key_bytes: &[u8],
    signature: &apella::SignatureData,
) {
    use k256::ecdsa::signature::hazmat::PrehashVerifier;
    let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key_bytes).unwrap();
    let backend_signature = k256::ecdsa::Signature::from_slice(&signature.signature).unwrap();
    verifying_key
        .verify_prehash(&signature.message, &backend_signature)
        .unwrap();

    // The recovery id reconstructs the same key.
    let recovery_id =
        k256::ecdsa::RecoveryId::try_from(signature.recovery_id.unwrap()).unwrap();
    let recovered = k256::ecdsa::VerifyingKey::recover_from_prehash(
        &signature.message,
        &backend_signature,
        recovery_id,
    )
    .unwrap();
    assert_eq!(recovered, verifying_key);
}

#[test_log::test]
fn ecdsa_keygen_and_sign_with_rotating_quorums() {
    let saves = ecdsa_saves();
    let public_key_bytes = saves[0].public_key().to_bytes();
    let message_hash = sha256_reduced(b"hello");

    for quorum in [[1u64, 2, 3], [2, 3, 5]] {
        let signatures = ecdsa_sign(&quorum, &message_hash);
        assert!(signatures[1..]
            .iter()
            .all(|signature| signature == &signatures[0]));
        verify_ecdsa_signature(&public_key_bytes, &signatures[0]);
    }
}

#[test_log::test]
fn ecdsa_resharing_hands_off_to_a_larger_committee() {
    let saves = ecdsa_saves();
    let public_key = *saves[0].public_key();
    let public_key_bytes = public_key.to_bytes();

    let old_peers = peer_context(&KEYGEN_KEYS);
    let new_keys: [u64; 7] = [11, 12, 13, 14, 15, 16, 17];
    let new_peers = peer_context(&new_keys);
    let new_threshold = 3;
    let seed = session_seed();

    let mut parties = Vec::new();
    for (position, id) in party_ids(&KEYGEN_KEYS).into_iter().enumerate() {
        let params = ReSharingParameters::new::<Secp256k1>(
            old_peers.clone(),
            KEYGEN_THRESHOLD,
            new_peers.clone(),
            new_threshold,
            id,
        )
        .unwrap();
        parties.push(
            ecdsa::resharing::new_party(
                &mut OsRng,
                params,
                Some(saves[position].clone()),
                None,
                &seed,
            )
            .unwrap(),
        );
    }
    for (position, id) in party_ids(&new_keys).into_iter().enumerate() {
        let params = ReSharingParameters::new::<Secp256k1>(
            old_peers.clone(),
            KEYGEN_THRESHOLD,
            new_peers.clone(),
            new_threshold,
            id,
        )
        .unwrap();
        parties.push(
            ecdsa::resharing::new_party(
                &mut OsRng,
                params,
                None,
                Some(pre_params(5 + position)),
                &seed,
            )
            .unwrap(),
        );
    }

    let outputs = run(parties).unwrap();
    let new_saves: Vec<ecdsa::LocalSaveData> = outputs.into_iter().flatten().collect();
    assert_eq!(new_saves.len(), 7);
    assert!(new_saves
        .iter()
        .all(|save| save.public_key() == &public_key));

    // The new committee signs under the unchanged public key.
    let message_hash = sha256_reduced(b"resharing test");
    let quorum_keys = [11u64, 13, 15, 17];
    let quorum = peer_context(&quorum_keys);
    let seed = session_seed();
    let signing_parties = quorum_keys
        .iter()
        .map(|key| {
            let save = new_saves
                .iter()
                .find(|save| save.self_id().key() == &BigUint::from(*key))
                .unwrap();
            let params = Parameters::new::<Secp256k1>(
                quorum.clone(),
                save.self_id().clone(),
                new_threshold,
            )
            .unwrap();
            ecdsa::signing::new_party(&mut OsRng, params, save.clone(), &message_hash, &seed)
                .unwrap()
        })
        .collect();
    let signatures = run(signing_parties).unwrap();
    verify_ecdsa_signature(&public_key_bytes, &signatures[0]);
}

#[test_log::test]
fn ecdsa_malformed_range_proof_names_the_culprit() {
    let saves = ecdsa_saves();
    let seed = session_seed();
    let quorum_keys = [1u64, 2, 3];
    let quorum = peer_context(&quorum_keys);
    let culprit_id = saves[1].self_id().clone();

    let parties: Vec<Party<apella::SignatureData>> = quorum_keys
        .iter()
        .map(|key| {
            let position = (*key - 1) as usize;
            let params = Parameters::new::<Secp256k1>(
                quorum.clone(),
                saves[position].self_id().clone(),
                KEYGEN_THRESHOLD,
            )
            .unwrap();
            ecdsa::signing::new_party(
                &mut OsRng,
                params,
                saves[position].clone(),
                &sha256_reduced(b"culprits"),
                &seed,
            )
            .unwrap()
        })
        .collect();

    // The first point-to-point messages of the signing protocol are the
    // round-2 range proofs; corrupt party 2's.
    let tampered = culprit_id.clone();
    let error = run_with(
        parties,
        Some(&move |routing: &MessageRouting, bytes: &mut Vec<u8>| {
            if routing.from == tampered && !routing.is_broadcast {
                let last = bytes.len() - 1;
                bytes[last] ^= 0xff;
            }
        }),
    )
    .unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::InvalidMessage(_)));
    assert_eq!(error.culprits(), &[culprit_id]);
}

#[test]
fn ecdsa_save_data_roundtrips_as_an_opaque_blob() {
    let saves = ecdsa_saves();
    let bytes = saves[0].to_bytes().unwrap();
    let restored = ecdsa::LocalSaveData::from_bytes(&bytes).unwrap();
    assert_eq!(restored.public_key(), saves[0].public_key());
    assert_eq!(restored.parties(), saves[0].parties());
}

fn eddsa_keygen(keys: &[u64], threshold: usize) -> Vec<eddsa::LocalSaveData> {
    let seed = session_seed();
    let peers = peer_context(keys);
    let parties = party_ids(keys)
        .into_iter()
        .map(|id| {
            let params = Parameters::new::<Ed25519>(peers.clone(), id, threshold).unwrap();
            eddsa::keygen::new_party(&mut OsRng, params, &seed).unwrap()
        })
        .collect();
    run(parties).unwrap()
}

fn eddsa_sign(
    saves: &[eddsa::LocalSaveData],
    quorum_keys: &[u64],
    threshold: usize,
    message: &[u8],
) -> apella::SignatureData {
    let seed = session_seed();
    let quorum = peer_context(quorum_keys);
    let parties = quorum_keys
        .iter()
        .map(|key| {
            let save = saves
                .iter()
                .find(|save| save.self_id().key() == &BigUint::from(*key))
                .unwrap();
            let params =
                Parameters::new::<Ed25519>(quorum.clone(), save.self_id().clone(), threshold)
                    .unwrap();
            eddsa::signing::new_party(&mut OsRng, params, save.clone(), message.to_vec(), &seed)
                .unwrap()
        })
        .collect();
    let signatures = run(parties).unwrap();
    assert!(signatures[1..]
        .iter()
        .all(|signature| signature == &signatures[0]));
    signatures.into_iter().next().unwrap()
}

fn verify_eddsa_signature(public_key: [u8; 32], message: &[u8], signature: &[u8]) {
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&public_key).unwrap();
    let backend_signature =
        ed25519_dalek::Signature::from_bytes(signature.try_into().unwrap());
    verifying_key
        .verify_strict(message, &backend_signature)
        .unwrap();
}

#[test_log::test]
fn eddsa_single_party_signature_is_stock_compatible() {
    // The trivial 1-of-1 threshold: the whole session completes at start().
    let saves = eddsa_keygen(&[1], 0);
    let message = b"Hello, FROST Ed25519 Standard Compatibility Test!";
    let signature = eddsa_sign(&saves, &[1], 0, message);
    assert_eq!(signature.signature.len(), 64);
    verify_eddsa_signature(saves[0].public_key_bytes(), message, &signature.signature);
}

#[test_log::test]
fn eddsa_threshold_signature_is_stock_compatible() {
    let saves = eddsa_keygen(&[1, 2, 3], 1);
    let message = [0u8; 32];
    let signature = eddsa_sign(&saves, &[1, 3], 1, &message);
    verify_eddsa_signature(saves[0].public_key_bytes(), &message, &signature.signature);
    assert_eq!(signature.message, message.to_vec());
}

#[test_log::test]
fn eddsa_resharing_preserves_the_key() {
    let saves = eddsa_keygen(&[1, 2, 3], 1);
    let public_key = saves[0].public_key_bytes();

    let old_peers = peer_context(&[1, 2, 3]);
    let new_keys = [2u64, 4, 5];
    let new_peers = peer_context(&new_keys);
    let seed = session_seed();

    let mut members = party_ids(&[1, 2, 3]);
    members.extend(party_ids(&[4, 5]));

    let parties = members
        .into_iter()
        .map(|id| {
            let params = ReSharingParameters::new::<Ed25519>(
                old_peers.clone(),
                1,
                new_peers.clone(),
                1,
                id.clone(),
            )
            .unwrap();
            let old_save = saves
                .iter()
                .find(|save| save.self_id() == &id)
                .cloned();
            eddsa::resharing::new_party(&mut OsRng, params, old_save, &seed).unwrap()
        })
        .collect();

    let outputs = run(parties).unwrap();
    let new_saves: Vec<eddsa::LocalSaveData> = outputs.into_iter().flatten().collect();
    assert_eq!(new_saves.len(), 3);

    let message = b"signed after the handoff";
    let signature = eddsa_sign(&new_saves, &[4, 5], 1, message);
    verify_eddsa_signature(public_key, message, &signature.signature);
}

#[test]
fn duplicate_messages_are_rejected_with_the_sender_as_culprit() {
    let seed = session_seed();
    let peers = peer_context(&[1, 2]);
    let mut parties: Vec<Party<eddsa::LocalSaveData>> = party_ids(&[1, 2])
        .into_iter()
        .map(|id| {
            let params = Parameters::new::<Ed25519>(peers.clone(), id, 1).unwrap();
            eddsa::keygen::new_party(&mut OsRng, params, &seed).unwrap()
        })
        .collect();

    let from_first = parties[0].start(&mut OsRng).unwrap();
    let _ = parties[1].start(&mut OsRng).unwrap();
    let message = &from_first[0];
    let sender = message.routing.from.clone();

    parties[1]
        .update_from_bytes(&message.wire_bytes, &sender, true, &mut OsRng)
        .unwrap();
    let error = parties[1]
        .update_from_bytes(&message.wire_bytes, &sender, true, &mut OsRng)
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Sequencing(_)));
    assert_eq!(error.culprits(), &[sender]);
}

#[test]
fn broadcast_claim_mismatch_names_the_sender() {
    let seed = session_seed();
    let peers = peer_context(&[1, 2]);
    let mut parties: Vec<Party<eddsa::LocalSaveData>> = party_ids(&[1, 2])
        .into_iter()
        .map(|id| {
            let params = Parameters::new::<Ed25519>(peers.clone(), id, 1).unwrap();
            eddsa::keygen::new_party(&mut OsRng, params, &seed).unwrap()
        })
        .collect();

    let from_first = parties[0].start(&mut OsRng).unwrap();
    let _ = parties[1].start(&mut OsRng).unwrap();
    let message = &from_first[0];
    let sender = message.routing.from.clone();

    // The transport claims per-recipient delivery for a broadcast wrapper.
    let error = parties[1]
        .update_from_bytes(&message.wire_bytes, &sender, false, &mut OsRng)
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::InvalidMessage(_)));
    assert_eq!(error.culprits(), &[sender]);
}
