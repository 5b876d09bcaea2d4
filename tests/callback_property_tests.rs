//! Property-based tests for callback authentication
//!
//! An attacker controls the body, the signature and the timestamp. These
//! tests check that no single-bit change to an authentic callback, and no
//! timestamp outside the freshness window, is ever accepted.

use esign_sync::callback::{CallbackAuthenticator, DEFAULT_FRESHNESS_SECS};
use esign_sync::error::AuthError;
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000;

fn auth() -> CallbackAuthenticator {
    CallbackAuthenticator::new("property-callback-key")
}

proptest! {
    /// An authentic callback inside the window always verifies
    #[test]
    fn authentic_callbacks_verify(
        body in prop::collection::vec(any::<u8>(), 0..256),
        skew in -DEFAULT_FRESHNESS_SECS..=DEFAULT_FRESHNESS_SECS,
    ) {
        let ts = NOW + skew;
        let signature = auth().sign(&body, ts).unwrap();
        prop_assert_eq!(auth().verify_at(&body, &signature, ts, NOW), Ok(()));
    }

    /// Flipping any bit of the body is detected
    #[test]
    fn body_bit_flip_is_rejected(
        body in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let signature = auth().sign(&body, NOW).unwrap();
        let mut forged = body.clone();
        let i = index.index(forged.len());
        forged[i] ^= 1 << bit;

        prop_assert_eq!(
            auth().verify_at(&forged, &signature, NOW, NOW),
            Err(AuthError::Mismatch)
        );
    }

    /// Flipping any bit of the signature is detected
    #[test]
    fn signature_bit_flip_is_rejected(
        body in prop::collection::vec(any::<u8>(), 0..128),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let signature = auth().sign(&body, NOW).unwrap();
        let mut raw = hex::decode(&signature).unwrap();
        let i = index.index(raw.len());
        raw[i] ^= 1 << bit;

        prop_assert_eq!(
            auth().verify_at(&body, &hex::encode(raw), NOW, NOW),
            Err(AuthError::Mismatch)
        );
    }

    /// Timestamps outside the window fail even with a valid signature
    #[test]
    fn stale_or_future_timestamps_are_rejected(
        body in prop::collection::vec(any::<u8>(), 0..64),
        offset in (DEFAULT_FRESHNESS_SECS + 1)..1_000_000,
        future in any::<bool>(),
    ) {
        let ts = if future { NOW + offset } else { NOW - offset };
        let signature = auth().sign(&body, ts).unwrap();
        let is_stale = matches!(
            auth().verify_at(&body, &signature, ts, NOW),
            Err(AuthError::Stale { .. })
        );
        prop_assert!(is_stale);
    }

    /// A signature made with the same body but a different timestamp does not verify
    #[test]
    fn signature_is_bound_to_timestamp(
        body in prop::collection::vec(any::<u8>(), 0..64),
        delta in 1i64..=DEFAULT_FRESHNESS_SECS,
    ) {
        let signature = auth().sign(&body, NOW - delta).unwrap();
        prop_assert_eq!(
            auth().verify_at(&body, &signature, NOW, NOW),
            Err(AuthError::Mismatch)
        );
    }
}

#[test]
fn empty_key_never_verifies() {
    let keyless = CallbackAuthenticator::new(Vec::<u8>::new());
    let signature = auth().sign(b"{}", NOW).unwrap();
    assert_eq!(
        keyless.verify_at(b"{}", &signature, NOW, NOW),
        Err(AuthError::MissingKey)
    );
}

#[test]
fn non_hex_signature_is_malformed() {
    assert_eq!(
        auth().verify_at(b"{}", "zz-not-hex", NOW, NOW),
        Err(AuthError::MalformedSignature)
    );
}
