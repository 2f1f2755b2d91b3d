/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Central message exchange: the pub/sub proxy between all publishers and
//! all subscribers, plus the static subscription plan derived from the
//! loaded component records.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::component::{ComponentKind, ComponentRecord};
use crate::config::BusAddresses;
use crate::error::Result;
use crate::observability::events;
use crate::wire;

const EVENT_QUEUE_DEPTH: usize = 256;
const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

enum BrokerEvent {
    Publish {
        topic: String,
        payload: Vec<u8>,
    },
    Register {
        id: u64,
        sender: mpsc::Sender<(String, Vec<u8>)>,
    },
    Deregister {
        id: u64,
    },
    Subscribe {
        id: u64,
        topic: String,
    },
    Unsubscribe {
        id: u64,
        topic: String,
    },
}

/// Owner of the bus sockets. Binding happens in [`Broker::start`]; bind
/// failures are fatal at startup, while forwarding errors are logged and the
/// proxy keeps running (best-effort delivery only).
pub struct Broker {
    addresses: BusAddresses,
}

/// Actually-bound bus addresses, resolved after binding (the configured
/// addresses may use port 0).
#[derive(Debug, Clone, Copy)]
pub struct BrokerHandle {
    pub xsub: SocketAddr,
    pub xpub: SocketAddr,
}

impl Broker {
    pub fn new(addresses: BusAddresses) -> Self {
        Self { addresses }
    }

    /// Binds both bus sockets and spawns the accept and forwarding loops.
    pub async fn start(&self) -> Result<BrokerHandle> {
        let xsub_listener = TcpListener::bind(self.addresses.xsub).await?;
        let xpub_listener = TcpListener::bind(self.addresses.xpub).await?;
        let handle = BrokerHandle {
            xsub: xsub_listener.local_addr()?,
            xpub: xpub_listener.local_addr()?,
        };
        info!(
            event = events::BROKER_BIND_OK,
            xsub = %handle.xsub,
            xpub = %handle.xpub,
            "bus sockets bound"
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        tokio::spawn(accept_publishers(xsub_listener, event_tx.clone()));
        tokio::spawn(accept_subscribers(xpub_listener, event_tx));
        tokio::spawn(forward_loop(event_rx));

        Ok(handle)
    }
}

async fn accept_publishers(listener: TcpListener, event_tx: mpsc::Sender<BrokerEvent>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!(peer = %peer, "publisher connected");
                tokio::spawn(publisher_loop(socket, event_tx.clone()));
            }
            Err(err) => {
                warn!(event = events::BROKER_ACCEPT_FAILED, err = %err, "publisher accept failed");
            }
        }
    }
}

async fn publisher_loop(mut socket: TcpStream, event_tx: mpsc::Sender<BrokerEvent>) {
    loop {
        match wire::read_message(&mut socket).await {
            Ok((topic, payload)) => {
                if event_tx
                    .send(BrokerEvent::Publish { topic, payload })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return,
            Err(err) => {
                // A byte stream cannot be resynchronized after a framing
                // error, so the connection is dropped rather than the broker.
                warn!(
                    event = events::BROKER_MALFORMED_MESSAGE,
                    err = %err,
                    "discarding undecodable publisher connection"
                );
                return;
            }
        }
    }
}

// Subscriber ids only need to be unique within one broker, and this task is
// the only one that assigns them.
async fn accept_subscribers(listener: TcpListener, event_tx: mpsc::Sender<BrokerEvent>) {
    let mut next_id: u64 = 0;
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let id = next_id;
                next_id += 1;
                debug!(peer = %peer, id, "subscriber connected");
                tokio::spawn(subscriber_loop(id, socket, event_tx.clone()));
            }
            Err(err) => {
                warn!(event = events::BROKER_ACCEPT_FAILED, err = %err, "subscriber accept failed");
            }
        }
    }
}

async fn subscriber_loop(id: u64, socket: TcpStream, event_tx: mpsc::Sender<BrokerEvent>) {
    let (mut reader, mut writer) = socket.into_split();
    let (queue_tx, mut queue_rx) = mpsc::channel::<(String, Vec<u8>)>(SUBSCRIBER_QUEUE_DEPTH);

    if event_tx
        .send(BrokerEvent::Register {
            id,
            sender: queue_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    let writer_task = tokio::spawn(async move {
        while let Some((topic, payload)) = queue_rx.recv().await {
            if wire::write_message(&mut writer, &topic, &payload)
                .await
                .is_err()
            {
                break;
            }
        }
    });

    loop {
        match wire::read_control(&mut reader).await {
            Ok((wire::OP_SUBSCRIBE, topic)) => {
                if event_tx
                    .send(BrokerEvent::Subscribe { id, topic })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok((wire::OP_UNSUBSCRIBE, topic)) => {
                if event_tx
                    .send(BrokerEvent::Unsubscribe { id, topic })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok((op, _)) => {
                warn!(
                    event = events::BROKER_MALFORMED_MESSAGE,
                    op, "unknown subscriber control op"
                );
            }
            Err(_) => break,
        }
    }

    let _ = event_tx.send(BrokerEvent::Deregister { id }).await;
    writer_task.abort();
}

struct SubscriberEntry {
    topics: BTreeSet<String>,
    sender: mpsc::Sender<(String, Vec<u8>)>,
}

/// Single owner of the subscriber registry. Data and registry traffic share
/// one queue processed one event per iteration, so neither direction starves
/// the other under load.
async fn forward_loop(mut event_rx: mpsc::Receiver<BrokerEvent>) {
    let mut subscribers: HashMap<u64, SubscriberEntry> = HashMap::new();

    while let Some(event) = event_rx.recv().await {
        match event {
            BrokerEvent::Register { id, sender } => {
                subscribers.insert(
                    id,
                    SubscriberEntry {
                        topics: BTreeSet::new(),
                        sender,
                    },
                );
            }
            BrokerEvent::Deregister { id } => {
                subscribers.remove(&id);
                debug!(event = events::BROKER_SUBSCRIBER_DROPPED, id, "subscriber removed");
            }
            BrokerEvent::Subscribe { id, topic } => {
                if let Some(entry) = subscribers.get_mut(&id) {
                    debug!(
                        event = events::BROKER_SUBSCRIBER_REGISTER,
                        id,
                        topic = %topic,
                        "subscription installed"
                    );
                    entry.topics.insert(topic);
                }
            }
            BrokerEvent::Unsubscribe { id, topic } => {
                if let Some(entry) = subscribers.get_mut(&id) {
                    entry.topics.remove(&topic);
                }
            }
            BrokerEvent::Publish { topic, payload } => {
                for (id, entry) in &subscribers {
                    if !entry.topics.contains(&topic) {
                        continue;
                    }
                    match entry.sender.try_send((topic.clone(), payload.clone())) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!(
                                event = events::BROKER_QUEUE_FULL,
                                id,
                                topic = %topic,
                                "subscriber queue full; dropping message"
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                }
            }
        }
    }
}

/// Static subscription plan: for every component, the set of bus topics it
/// must receive.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionTable {
    topics: BTreeMap<String, BTreeSet<String>>,
}

impl SubscriptionTable {
    /// Resolves every component's topic-valued inputs, then wires each plugin
    /// output naming an outbound stream so that stream receives the plugin's
    /// own topic. Port-valued inputs get no bus subscription (the component
    /// reads from a socket instead); a plugin output with no matching
    /// outbound stream is reported and receives no subscriber.
    pub fn compute(records: &[ComponentRecord]) -> Self {
        let mut topics: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for record in records {
            for input in &record.inputs {
                if let Some(topic) = input.topic() {
                    topics
                        .entry(record.name.clone())
                        .or_default()
                        .insert(topic.to_string());
                }
            }
        }

        for record in records.iter().filter(|r| r.kind == ComponentKind::Plugin) {
            for output in &record.outputs {
                let Some(target) = output.topic() else {
                    continue;
                };
                let matched = records.iter().any(|candidate| {
                    candidate.kind == ComponentKind::OutboundStream && candidate.name == target
                });
                if matched {
                    topics
                        .entry(target.to_string())
                        .or_default()
                        .insert(record.name.clone());
                } else {
                    warn!(
                        event = events::SUBSCRIPTION_OUTPUT_UNMATCHED,
                        plugin = %record.name,
                        output = %target,
                        "plugin output names no outbound stream; it will have no subscriber"
                    );
                }
            }
        }

        Self { topics }
    }

    pub fn topics_for(&self, name: &str) -> Vec<String> {
        self.topics
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}
