use std::time::Instant;

use tr0nk::udptl::{ErrorCorrection, UdptlSession};
use tr0nk::Error;

mod common;
use common::init_log;

fn ifp(i: u8) -> Vec<u8> {
    // Distinct per-packet payloads with differing lengths to exercise the XOR
    // high-tide length handling.
    let mut v = vec![i; 8 + (i as usize % 5)];
    v.push(0xf0 | i);
    v
}

#[test]
fn fec_recovers_single_loss() -> Result<(), Error> {
    init_log();

    let ec = ErrorCorrection::Fec { span: 3, entries: 3 };
    let mut tx = UdptlSession::new(ec)?;
    let mut rx = UdptlSession::new(ec)?;
    let now = Instant::now();

    // Equal lengths so the repaired payload compares exactly (XOR repair pads to the
    // longest packet in the window otherwise).
    let payload = |i: u8| vec![i; 12];
    let mut delivered: Vec<(u64, Vec<u8>)> = Vec::new();

    for i in 0..=8u8 {
        let wire = tx.build_packet(&payload(i))?;
        if i == 5 {
            // The network eats packet 5.
            continue;
        }
        for f in rx.rx_packet(&wire, now) {
            delivered.push((*f.seq.unwrap(), f.payload));
        }
    }

    // Every payload arrives exactly once, in order, with the repaired packet slotted
    // in before the packet whose FEC recovered it.
    let seqs: Vec<u64> = delivered.iter().map(|(s, _)| *s).collect();
    assert_eq!(seqs, (0..=8u64).collect::<Vec<_>>());
    for (s, p) in &delivered {
        assert_eq!(*p, payload(*s as u8), "payload of seq {}", s);
    }

    Ok(())
}

#[test]
fn fec_repair_pads_to_window_high_tide() -> Result<(), Error> {
    init_log();

    let ec = ErrorCorrection::Fec { span: 3, entries: 3 };
    let mut tx = UdptlSession::new(ec)?;
    let mut rx = UdptlSession::new(ec)?;
    let now = Instant::now();

    let mut repaired: Option<Vec<u8>> = None;

    for i in 0..=8u8 {
        let wire = tx.build_packet(&ifp(i))?;
        if i == 5 {
            continue;
        }
        for f in rx.rx_packet(&wire, now) {
            if f.seq == Some(5u64.into()) {
                repaired = Some(f.payload);
            }
        }
    }

    // The XOR record is as long as the longest window member; the recovered packet
    // comes back with trailing zeros past its original length.
    let repaired = repaired.expect("packet 5 repaired");
    let original = ifp(5);
    assert!(repaired.len() >= original.len());
    assert_eq!(&repaired[..original.len()], &original[..]);
    assert!(repaired[original.len()..].iter().all(|b| *b == 0));

    Ok(())
}

#[test]
fn fec_two_losses_in_one_window_stay_lost() -> Result<(), Error> {
    init_log();

    let ec = ErrorCorrection::Fec { span: 3, entries: 1 };
    let mut tx = UdptlSession::new(ec)?;
    let mut rx = UdptlSession::new(ec)?;
    let now = Instant::now();

    let mut seqs = Vec::new();
    for i in 0..=6u8 {
        let wire = tx.build_packet(&ifp(i))?;
        // Adjacent losses inside every covering window.
        if i == 3 || i == 4 {
            continue;
        }
        for f in rx.rx_packet(&wire, now) {
            seqs.push(*f.seq.unwrap());
        }
    }

    assert!(!seqs.contains(&3));
    assert!(!seqs.contains(&4));
    assert_eq!(seqs, vec![0, 1, 2, 5, 6]);

    Ok(())
}

#[test]
fn redundancy_replays_missing_packets() -> Result<(), Error> {
    init_log();

    let ec = ErrorCorrection::Redundancy { entries: 3 };
    let mut tx = UdptlSession::new(ec)?;
    let mut rx = UdptlSession::new(ec)?;
    let now = Instant::now();

    let mut delivered: Vec<(u64, Vec<u8>)> = Vec::new();

    for i in 0..6u8 {
        let wire = tx.build_packet(&ifp(i))?;
        // A two packet burst loss, inside the redundancy depth.
        if i == 2 || i == 3 {
            continue;
        }
        for f in rx.rx_packet(&wire, now) {
            delivered.push((*f.seq.unwrap(), f.payload));
        }
    }

    // Packet 4 carries secondaries 1..=3 and fills the hole.
    let seqs: Vec<u64> = delivered.iter().map(|(s, _)| *s).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
    for (s, payload) in &delivered {
        assert_eq!(*payload, ifp(*s as u8), "payload of seq {}", s);
    }

    Ok(())
}

#[test]
fn redundancy_loss_beyond_depth_stays_lost() -> Result<(), Error> {
    init_log();

    let ec = ErrorCorrection::Redundancy { entries: 2 };
    let mut tx = UdptlSession::new(ec)?;
    let mut rx = UdptlSession::new(ec)?;
    let now = Instant::now();

    let mut seqs = Vec::new();
    for i in 0..7u8 {
        let wire = tx.build_packet(&ifp(i))?;
        // Three consecutive losses, one more than the redundancy depth.
        if i >= 2 && i <= 4 {
            continue;
        }
        for f in rx.rx_packet(&wire, now) {
            seqs.push(*f.seq.unwrap());
        }
    }

    // Packet 5 replays 3 and 4; packet 2 is gone for good.
    assert_eq!(seqs, vec![0, 1, 3, 4, 5, 6]);

    Ok(())
}

#[test]
fn duplicated_packets_are_noops() -> Result<(), Error> {
    init_log();

    let ec = ErrorCorrection::Redundancy { entries: 2 };
    let mut tx = UdptlSession::new(ec)?;
    let mut rx = UdptlSession::new(ec)?;
    let now = Instant::now();

    let wires: Vec<Vec<u8>> = (0..4u8)
        .map(|i| tx.build_packet(&ifp(i)))
        .collect::<Result<_, _>>()?;

    let mut seqs = Vec::new();
    // The network duplicates everything.
    for wire in wires.iter().chain(wires.iter()) {
        for f in rx.rx_packet(wire, now) {
            seqs.push(*f.seq.unwrap());
        }
    }

    assert_eq!(seqs, vec![0, 1, 2, 3]);

    Ok(())
}

#[test]
fn mismatched_schemes_still_interoperate() -> Result<(), Error> {
    init_log();

    // The trailer is self-describing: a receiver configured for FEC still parses
    // redundancy trailers from a peer that negotiated differently.
    let mut tx = UdptlSession::new(ErrorCorrection::Redundancy { entries: 2 })?;
    let mut rx = UdptlSession::new(ErrorCorrection::Fec { span: 3, entries: 3 })?;
    let now = Instant::now();

    let mut seqs = Vec::new();
    for i in 0..4u8 {
        let wire = tx.build_packet(&ifp(i))?;
        if i == 1 {
            continue;
        }
        for f in rx.rx_packet(&wire, now) {
            seqs.push(*f.seq.unwrap());
        }
    }

    assert_eq!(seqs, vec![0, 1, 2, 3]);

    Ok(())
}
