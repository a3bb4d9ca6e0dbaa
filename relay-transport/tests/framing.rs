//! Byte-exactness checks for the frame codecs.

use relay_transport::{abridged, full, intermediate};

#[test]
fn abridged_short_frames_use_one_header_byte() {
    for words in [0usize, 1, 31, 126] {
        let payload = vec![0xA7u8; words * 4];
        let frame = abridged::encode(&payload);
        assert_eq!(frame[0] as usize, words);
        assert_eq!(&frame[1..], &payload[..]);
        assert_eq!(abridged::decode(&frame), Some(payload));
    }
}

#[test]
fn abridged_round_trips_both_header_forms() {
    for words in [1usize, 126, 127, 4000] {
        let payload = vec![0x3Cu8; words * 4];
        assert_eq!(abridged::decode(&abridged::encode(&payload)), Some(payload));
    }
    assert_eq!(abridged::decode(&[]), None);
    assert_eq!(abridged::decode(&[2, 0, 0, 0, 0]), None);
}

#[test]
fn abridged_long_frames_use_the_extended_header() {
    let words = 127usize;
    let payload = vec![0x01u8; words * 4];
    let frame = abridged::encode(&payload);
    assert_eq!(frame[0], 0x7f);
    assert_eq!(frame[1] as usize, words & 0xff);
    assert_eq!(frame[2] as usize, (words >> 8) & 0xff);
    assert_eq!(frame[3] as usize, (words >> 16) & 0xff);
    assert_eq!(&frame[4..], &payload[..]);

    // A genuinely large frame exercises the higher header bytes.
    let words = 0x01_02_03usize;
    let frame = abridged::encode(&vec![0u8; words * 4]);
    assert_eq!(&frame[..4], &[0x7f, 0x03, 0x02, 0x01]);
}

#[test]
fn intermediate_frames_are_length_prefixed_exactly() {
    let payload = b"\x01\x02\x03\x04\x05\x06\x07\x08";
    let frame = intermediate::encode(payload);
    assert_eq!(&frame[..4], &(payload.len() as u32).to_le_bytes());
    assert_eq!(&frame[4..], payload);
    assert_eq!(frame.len(), payload.len() + 4);

    assert_eq!(intermediate::encode(&[]), vec![0, 0, 0, 0]);
}

#[test]
fn intermediate_round_trips() {
    for len in [0usize, 4, 1024] {
        let payload = vec![0xE1u8; len];
        assert_eq!(
            intermediate::decode(&intermediate::encode(&payload)),
            Some(payload)
        );
    }
    assert_eq!(intermediate::decode(&[1, 0, 0, 0]), None);
}

#[test]
fn full_frames_round_trip() {
    for seq in [0u32, 1, 0xDEAD] {
        let payload = vec![0x5Cu8; 32];
        let frame = full::pack(&payload, seq);
        assert_eq!(full::unpack(&frame, seq), Some(payload));
    }
}

#[test]
fn full_frame_layout_is_exact() {
    let payload = b"\xAA\xBB\xCC\xDD";
    let frame = full::pack(payload, 7);

    assert_eq!(frame.len(), payload.len() + 12);
    assert_eq!(&frame[..4], &(frame.len() as u32).to_le_bytes());
    assert_eq!(&frame[4..8], &7u32.to_le_bytes());
    assert_eq!(&frame[8..12], payload);

    let crc = full::crc32(&frame[..frame.len() - 4]);
    assert_eq!(&frame[frame.len() - 4..], &crc.to_le_bytes());
}

#[test]
fn full_rejects_any_single_bit_flip() {
    let payload = b"integrity matters".to_vec();
    let frame = full::pack(&payload, 3);

    for i in 0..frame.len() {
        let mut corrupted = frame.clone();
        corrupted[i] ^= 0x01;
        assert_eq!(
            full::unpack(&corrupted, 3),
            None,
            "flip at byte {i} must not pass verification",
        );
    }
}

#[test]
fn full_rejects_wrong_sequence() {
    let frame = full::pack(b"ordered", 5);
    assert!(full::unpack(&frame, 5).is_some());
    assert_eq!(full::unpack(&frame, 6), None);
}

#[test]
fn full_rejects_truncated_frames() {
    let frame = full::pack(b"short", 0);
    assert_eq!(full::unpack(&frame[..frame.len() - 1], 0), None);
    assert_eq!(full::unpack(&[], 0), None);
    assert_eq!(full::unpack(&[0; 11], 0), None);
}

#[test]
fn crc32_matches_known_vectors() {
    // Standard IEEE 802.3 check value.
    assert_eq!(full::crc32(b"123456789"), 0xCBF43926);
    assert_eq!(full::crc32(b""), 0);
}
