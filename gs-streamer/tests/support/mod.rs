/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

#![allow(dead_code)]

use std::time::Duration;

use tokio::net::UdpSocket;

pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
pub const SEND_INTERVAL: Duration = Duration::from_millis(50);

/// Installs the log subscriber; safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// A UDP port nothing is currently bound to.
pub async fn free_udp_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind should succeed");
    let port = socket
        .local_addr()
        .expect("bound socket has an address")
        .port();
    drop(socket);
    port
}

/// Waits for one datagram on the socket, failing the test on timeout.
pub async fn recv_datagram(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 65535];
    let len = tokio::time::timeout(RECEIVE_TIMEOUT, socket.recv(&mut buf))
        .await
        .expect("datagram should arrive in time")
        .expect("receive should succeed");
    buf.truncate(len);
    buf
}
