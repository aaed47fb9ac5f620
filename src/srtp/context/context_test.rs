use super::*;

const CIPHER_CONTEXT_ALGO: ProtectionProfile = ProtectionProfile::Aes128CmHmacSha1_80;

fn test_key() -> Vec<u8> {
    vec![
        0x0d, 0xcd, 0x21, 0x3e, 0x4c, 0xbc, 0xf2, 0x8f, 0x01, 0x7f, 0x69, 0x94, 0x40, 0x1e, 0x28,
        0x89,
    ]
}

fn test_salt() -> Vec<u8> {
    vec![
        0x62, 0x77, 0x60, 0x38, 0xc0, 0x6d, 0xc9, 0x41, 0x9f, 0x6d, 0xd9, 0x43, 0x3e, 0x7c,
    ]
}

#[test]
fn test_context_validates_key_and_salt_len() {
    let result = Context::new(&[], &test_salt(), CIPHER_CONTEXT_ALGO, None, None);
    assert_eq!(result.err(), Some(Error::SrtpMasterKeyLength(16, 0)));

    let result = Context::new(&test_key(), &[], CIPHER_CONTEXT_ALGO, None, None);
    assert_eq!(result.err(), Some(Error::SrtpSaltLength(14, 0)));

    let result = Context::new(&test_key(), &test_salt(), CIPHER_CONTEXT_ALGO, None, None);
    assert!(
        result.is_ok(),
        "Context::new failed with a valid length key and salt"
    );
}

#[test]
fn test_context_all_profiles_construct() -> Result<()> {
    for profile in [
        ProtectionProfile::Aes128CmHmacSha1_80,
        ProtectionProfile::Aes128CmHmacSha1_32,
        ProtectionProfile::NullHmacSha1_80,
        ProtectionProfile::NullHmacSha1_32,
    ] {
        Context::new(&test_key(), &test_salt(), profile, None, None)?;
    }
    Ok(())
}

#[test]
fn test_context_roc() -> Result<()> {
    let mut c = Context::new(&test_key(), &test_salt(), CIPHER_CONTEXT_ALGO, None, None)?;

    assert_eq!(c.roc(123), None, "ROC must not exist before any packet");

    c.set_roc(123, 100);
    assert_eq!(c.roc(123), Some(100));

    Ok(())
}

#[test]
fn test_context_index() -> Result<()> {
    let mut c = Context::new(&test_key(), &test_salt(), CIPHER_CONTEXT_ALGO, None, None)?;

    assert_eq!(c.index(123), None, "Index must not exist before any packet");

    c.set_index(123, 100);
    assert_eq!(c.index(123), Some(100));

    c.set_index(123, MAX_SRTCP_INDEX + 1);
    assert_eq!(c.index(123), Some(0), "SRTCP index must wrap at 2^31");

    Ok(())
}

#[test]
fn test_rollover_count_boundaries() {
    // A receiver that last saw the top of the sequence space guesses
    // ROC + 1 for small sequence numbers.
    let s = SrtpSsrcState {
        rollover_counter: 1,
        highest_sequence: 65533,
        seen_first_packet: true,
        ..Default::default()
    };
    let (roc, _) = s.estimate_rollover_count(10);
    assert_eq!(roc, 2, "Wrap to the next ROC was not detected");

    // And ROC - 1 for a late straggler from before the wrap.
    let s = SrtpSsrcState {
        rollover_counter: 2,
        highest_sequence: 0,
        seen_first_packet: true,
        ..Default::default()
    };
    let (roc, _) = s.estimate_rollover_count(65533);
    assert_eq!(roc, 1, "Late packet from the previous ROC misclassified");

    // A stream still in ROC 0 never guesses backwards past the start.
    let s = SrtpSsrcState {
        rollover_counter: 0,
        highest_sequence: 2,
        seen_first_packet: true,
        ..Default::default()
    };
    let (roc, _) = s.estimate_rollover_count(65530);
    assert_eq!(roc, 0, "Fresh stream guessed below ROC 0");
}

#[test]
fn test_rollover_count_exhaustion_flagged() {
    let s = SrtpSsrcState {
        rollover_counter: MAX_ROC,
        highest_sequence: 65000,
        seen_first_packet: true,
        ..Default::default()
    };
    let (_, exhausted) = s.estimate_rollover_count(3);
    assert!(exhausted, "index wrap past 2^48 was not flagged");
}

#[test]
fn test_rollover_count_in_order_stream() {
    let mut s = SrtpSsrcState::default();

    for seq in [65533u16, 65534, 65535, 0, 1, 2] {
        let (roc, exhausted) = s.estimate_rollover_count(seq);
        assert!(!exhausted);
        let expected = if seq < 3 { 1 } else { 0 };
        assert_eq!(roc, expected, "unexpected ROC at seq {seq}");
        s.commit(seq, roc);
    }

    assert_eq!(s.rollover_counter, 1);
    assert_eq!(s.highest_sequence, 2);

    // A late straggler from before the wrap is decryptable with ROC 0 but
    // must not move the highest index backwards.
    let (roc, _) = s.estimate_rollover_count(65535);
    assert_eq!(roc, 0);
    s.commit(65535, roc);
    assert_eq!(s.rollover_counter, 1);
    assert_eq!(s.highest_sequence, 2);
}
