//! Paillier encryption and the ring-Pedersen commitments built on the same moduli.

mod encryption;
mod keys;
mod ring_pedersen;

pub(crate) use encryption::Ciphertext;
pub(crate) use keys::{PublicKeyPaillier, SecretKeyPaillier};
pub(crate) use ring_pedersen::{RPCommitment, RPParams, RPSecret};
