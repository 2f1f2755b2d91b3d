/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Bus-side transport adapters: the publisher and subscriber clients every
//! component uses to reach the broker's proxy sockets.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::transport::Publisher;
use crate::wire;

/// Outbound bus connection. Publishes under `default_topic` (the owning
/// component's name) unless an explicit override topic is supplied.
pub struct BusPublisher {
    default_topic: String,
    stream: Mutex<TcpStream>,
}

impl BusPublisher {
    pub async fn connect(xsub: SocketAddr, default_topic: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(xsub).await?;
        Ok(Self {
            default_topic: default_topic.to_string(),
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl Publisher for BusPublisher {
    async fn publish(&self, payload: &[u8], topic: Option<&str>) -> std::io::Result<()> {
        let topic = topic.unwrap_or(&self.default_topic);
        let mut stream = self.stream.lock().await;
        wire::write_message(&mut *stream, topic, payload).await
    }
}

/// Inbound bus connection that installs its topic subscriptions on connect
/// and then yields messages in arrival order.
pub struct BusSubscriber {
    stream: TcpStream,
}

impl BusSubscriber {
    pub async fn connect(xpub: SocketAddr, topics: &[String]) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(xpub).await?;
        for topic in topics {
            wire::write_control(&mut stream, wire::OP_SUBSCRIBE, topic).await?;
        }
        Ok(Self { stream })
    }

    /// Receives the next bus message; `Ok(None)` means the broker closed the
    /// connection.
    pub async fn next(&mut self) -> std::io::Result<Option<(String, Vec<u8>)>> {
        match wire::read_message(&mut self.stream).await {
            Ok(message) => Ok(Some(message)),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }
}
