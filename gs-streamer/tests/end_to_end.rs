/********************************************************************************
 * Copyright (c) 2025 Contributors to the gs-streamer project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod support;

use tokio::net::UdpSocket;

use gs_streamer::transport::Publisher;
use gs_streamer::{Config, HandlerRegistry, PluginRegistry, Server};

async fn started_server(config_text: &str) -> gs_streamer::RunningServer {
    support::init_logging();
    let config = Config::from_json5(config_text).expect("test config should parse");
    let mut server = Server::new(config, HandlerRegistry::new(), PluginRegistry::new())
        .expect("server should build");
    server.load_streams();
    server.load_plugins();
    server.start().await.expect("server should start")
}

/// UDP in, bus forwarding, UDP out: a datagram sent to the inbound stream's
/// listen port arrives unchanged at the outbound stream's destination.
#[tokio::test]
async fn datagram_crosses_the_bus_from_udp_input_to_udp_output() {
    let in_port = support::free_udp_port().await;
    let out_socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("out socket should bind");
    let out_port = out_socket
        .local_addr()
        .expect("bound socket has an address")
        .port();

    let running = started_server(&format!(
        r#"{{
            server: {{
                xsub: "127.0.0.1:0",
                xpub: "127.0.0.1:0",
                "inbound-streams": [
                    {{ name: "tlm_in", input: [{in_port}] }},
                ],
                "outbound-streams": [
                    {{ name: "tlm_out", input: ["tlm_in"], output: [{out_port}] }},
                ],
            }}
        }}"#
    ))
    .await;

    // Startup is asynchronous; resend until the topology is live end to end.
    let sender = tokio::spawn(async move {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("send socket should bind");
        loop {
            socket
                .send_to(b"\x01\x02", ("127.0.0.1", in_port))
                .await
                .expect("send should succeed");
            tokio::time::sleep(support::SEND_INTERVAL).await;
        }
    });

    let received = support::recv_datagram(&out_socket).await;
    sender.abort();
    drop(running);

    assert_eq!(received, b"\x01\x02");
}

/// Bus in, plugin processing, UDP out: a message published under a topic the
/// plugin consumes reappears, via the plugin's output wiring, at the outbound
/// stream's destination.
#[tokio::test]
async fn plugin_bridges_two_streams_across_the_bus() {
    let out_socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("out socket should bind");
    let out_port = out_socket
        .local_addr()
        .expect("bound socket has an address")
        .port();

    let running = started_server(&format!(
        r#"{{
            server: {{
                xsub: "127.0.0.1:0",
                xpub: "127.0.0.1:0",
                "outbound-streams": [
                    {{ name: "streamB", output: [{out_port}] }},
                ],
                plugins: [
                    {{
                        name: "accumulator",
                        inputs: ["streamA"],
                        outputs: ["streamB"],
                        threshold: 1,
                    }},
                ],
            }}
        }}"#
    ))
    .await;
    let bus = running.bus_addresses();

    let sender = tokio::spawn(async move {
        let publisher = gs_streamer::bus::BusPublisher::connect(bus.xsub, "streamA")
            .await
            .expect("publisher should connect");
        loop {
            publisher
                .publish(b"telemetry-frame", None)
                .await
                .expect("publish should succeed");
            tokio::time::sleep(support::SEND_INTERVAL).await;
        }
    });

    let received = support::recv_datagram(&out_socket).await;
    sender.abort();
    drop(running);

    assert_eq!(received, b"telemetry-frame");
}
