#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Concurrency tests: parallel pipelines, connection map races, and shared
//! buffer accounting under contention.

use packet_intercept::core::buffer::ByteBuf;
use packet_intercept::core::varint::write_var_int;
use packet_intercept::protocol::connection::{ChannelId, ConnectionMap, User};
use packet_intercept::protocol::event::{EventManager, ListenerPriority, PacketEvent, PacketSide};
use packet_intercept::protocol::pipeline::InterceptPipeline;
use packet_intercept::protocol::version::ProtocolVersion;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn parallel_connections_do_not_interfere() {
    let events = Arc::new(EventManager::new());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    events.register(
        ListenerPriority::Normal,
        Arc::new(move |event: &mut PacketEvent| {
            // cancel odd channels only
            if event.user().channel().0 % 2 == 1 {
                event.cancel();
            }
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    let pipeline = Arc::new(InterceptPipeline::new(events));

    let threads = 8;
    let packets_per_thread = 200;
    let mut handles = Vec::new();
    for t in 0..threads {
        let pipeline = Arc::clone(&pipeline);
        handles.push(thread::spawn(move || {
            let user = Arc::new(User::new(ChannelId(t), ProtocolVersion::V1_20_2));
            for i in 0..packets_per_thread {
                let buffer = ByteBuf::new();
                write_var_int(&buffer, 0x05).unwrap();
                buffer.write_bytes(&[i as u8; 16]).unwrap();

                let event = pipeline
                    .handle_packet(&user, buffer, PacketSide::Client)
                    .unwrap()
                    .unwrap();
                if t % 2 == 1 {
                    assert!(event.is_cancelled());
                    assert!(!event.buffer().is_readable().unwrap());
                } else {
                    assert!(!event.is_cancelled());
                    assert!(event.buffer().is_readable().unwrap());
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (threads * packets_per_thread) as u64;
    assert_eq!(seen.load(Ordering::SeqCst) as u64, total);
    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.packets_intercepted, total);
    assert_eq!(
        snapshot.packets_cancelled + snapshot.packets_passed_through,
        total
    );
}

#[test]
fn connection_map_handles_racing_reconnects() {
    let map = Arc::new(ConnectionMap::new());
    let channel = ChannelId(1);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for _ in 0..500 {
                let fresh = Arc::new(User::new(channel, ProtocolVersion::V1_20_2));
                let stale = map.insert(Arc::clone(&fresh));
                // a stale disconnect must not evict the fresh session
                if let Some(stale) = stale {
                    assert!(!map.remove_if_same(channel, &stale) || map.get(channel).is_none());
                }
                map.insert(fresh);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // exactly the last inserted session remains
    assert_eq!(map.len(), 1);
    assert!(map.get(channel).is_some());
}

#[test]
fn stale_disconnect_never_removes_new_session() {
    let map = ConnectionMap::new();
    let channel = ChannelId(3);

    let old = Arc::new(User::new(channel, ProtocolVersion::V1_16_4));
    map.insert(Arc::clone(&old));
    let new = Arc::new(User::new(channel, ProtocolVersion::V1_20_2));
    let evicted = map.insert(Arc::clone(&new)).unwrap();
    assert!(Arc::ptr_eq(&evicted, &old));

    // the old session's late disconnect callback fires now
    assert!(!map.remove_if_same(channel, &old));
    let current = map.get(channel).unwrap();
    assert!(Arc::ptr_eq(&current, &new));
}

#[test]
fn shared_buffer_refcount_is_exact_under_contention() {
    let buffer = ByteBuf::from_slice(&[0u8; 32]);
    let threads = 8;
    let rounds = 1000;

    let mut handles = Vec::new();
    for _ in 0..threads {
        let buffer = buffer.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..rounds {
                let held = buffer.retain().unwrap();
                assert!(!held.release().unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(buffer.ref_cnt(), 1);
    assert!(buffer.release().unwrap());
}

#[test]
fn listener_registration_races_with_dispatch() {
    let events = Arc::new(EventManager::new());
    let pipeline = Arc::new(InterceptPipeline::new(Arc::clone(&events)));

    let registrar = {
        let events = Arc::clone(&events);
        thread::spawn(move || {
            for _ in 0..100 {
                events.register(
                    ListenerPriority::Normal,
                    Arc::new(|_: &mut PacketEvent| Ok(())),
                );
            }
        })
    };

    let user = Arc::new(User::new(ChannelId(9), ProtocolVersion::V1_20_2));
    for _ in 0..500 {
        let buffer = ByteBuf::new();
        write_var_int(&buffer, 0x01).unwrap();
        buffer.write_bytes(&[0xAA]).unwrap();
        pipeline
            .handle_packet(&user, buffer, PacketSide::Server)
            .unwrap()
            .unwrap();
    }
    registrar.join().unwrap();
    assert_eq!(events.listener_count(), 100);
}
