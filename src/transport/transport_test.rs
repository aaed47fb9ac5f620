use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use util::marshal::*;

use super::*;
use crate::alert::AlertDescription;

fn config_with(profiles: Vec<ProtectionProfile>) -> Config {
    Config {
        offered_profiles: profiles,
        ..Default::default()
    }
}

/// Wires `a`'s outbound bytes into `b`'s receive stream.
fn pipe(a: &Arc<DtlsSrtpTransport>, b: &Arc<DtlsSrtpTransport>) {
    let to = Arc::clone(b);
    a.on_data_ready(Box::new(move |data: Bytes| {
        let to = Arc::clone(&to);
        Box::pin(async move {
            let _ = to.write_to_recv_stream(&data).await;
        })
    }));
}

fn loopback_pair(
    client_config: Config,
    server_config: Config,
) -> Result<(Arc<DtlsSrtpTransport>, Arc<DtlsSrtpTransport>)> {
    let client = Arc::new(DtlsSrtpTransport::new(DtlsRole::Client, client_config)?);
    let server = Arc::new(DtlsSrtpTransport::new(DtlsRole::Server, server_config)?);
    pipe(&client, &server);
    pipe(&server, &client);
    Ok((client, server))
}

fn test_rtp_packet(sequence_number: u16) -> Result<Bytes> {
    let pkt = rtp::packet::Packet {
        header: rtp::header::Header {
            version: 2,
            ssrc: 0xCAFEBABE,
            sequence_number,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0x10, 0x20, 0x30, 0x40]),
    };
    Ok(pkt.marshal()?)
}

#[tokio::test]
async fn test_loopback_handshake_aes128_cm_hmac_sha1_80() -> Result<()> {
    let (client, server) = loopback_pair(
        config_with(vec![ProtectionProfile::Aes128CmHmacSha1_80]),
        config_with(vec![ProtectionProfile::Aes128CmHmacSha1_80]),
    )?;

    let (client_result, server_result) = tokio::join!(client.do_handshake(), server.do_handshake());
    client_result?;
    server_result?;

    assert_eq!(
        client.negotiated_profile().await,
        Some(ProtectionProfile::Aes128CmHmacSha1_80)
    );
    assert_eq!(
        server.negotiated_profile().await,
        Some(ProtectionProfile::Aes128CmHmacSha1_80)
    );

    // Both sides hold byte-identical exporter partitions.
    let client_keys = client.keying_material().await.unwrap();
    let server_keys = server.keying_material().await.unwrap();
    assert_eq!(client_keys.client_key, server_keys.client_key);
    assert_eq!(client_keys.server_key, server_keys.server_key);
    assert_eq!(client_keys.client_salt, server_keys.client_salt);
    assert_eq!(client_keys.server_salt, server_keys.server_salt);
    assert_eq!(client_keys.client_key.len(), 16);
    assert_eq!(client_keys.client_salt.len(), 14);

    assert!(!client.remote_certificates().await.is_empty());
    assert!(!server.remote_certificates().await.is_empty());

    // do_handshake is idempotent once complete.
    client.do_handshake().await?;

    // Media flows in both directions through the negotiated contexts.
    let raw = test_rtp_packet(1)?;
    let protected = client.protect_rtp(&raw).await?;
    assert_eq!(protected.len(), raw.len() + 10);
    assert_eq!(server.unprotect_rtp(&protected).await?, raw);

    let raw = test_rtp_packet(1)?;
    let protected = server.protect_rtp(&raw).await?;
    assert_eq!(client.unprotect_rtp(&protected).await?, raw);

    // With rtcp-mux both packet kinds ride the same dispatch surface.
    let raw = test_rtp_packet(2)?;
    let protected = client.protect_rtp(&raw).await?;
    assert_eq!(server.unprotect(&protected).await?, raw);

    let pli = rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication {
        sender_ssrc: 0xCAFEBABE,
        media_ssrc: 0xDEADBEEF,
    };
    let raw = pli.marshal()?;
    let protected = client.protect_rtcp(&raw).await?;
    assert_eq!(server.unprotect(&protected).await?, raw);

    assert_eq!(
        server.unprotect(&[22, 1, 2, 3]).await.err(),
        Some(Error::UnhandledPacketType)
    );

    client.close().await?;
    server.close().await?;

    assert_eq!(
        client.protect_rtp(&test_rtp_packet(2)?).await.err(),
        Some(Error::TransportClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_profile_negotiation_first_client_match_wins() -> Result<()> {
    // NULL profiles cannot ride the use_srtp extension; the first AES-CM
    // profile of the client's offer that the server supports wins.
    let (client, server) = loopback_pair(
        config_with(vec![
            ProtectionProfile::Aes128CmHmacSha1_32,
            ProtectionProfile::NullHmacSha1_80,
            ProtectionProfile::Aes128CmHmacSha1_80,
        ]),
        Config::default(),
    )?;

    let (client_result, server_result) = tokio::join!(client.do_handshake(), server.do_handshake());
    client_result?;
    server_result?;

    assert_eq!(
        client.negotiated_profile().await,
        Some(ProtectionProfile::Aes128CmHmacSha1_32)
    );
    assert_eq!(
        server.negotiated_profile().await,
        Some(ProtectionProfile::Aes128CmHmacSha1_32)
    );

    // The 32 bit profile truncates RTP tags to 4 bytes.
    let raw = test_rtp_packet(9)?;
    let protected = client.protect_rtp(&raw).await?;
    assert_eq!(protected.len(), raw.len() + 4);
    assert_eq!(server.unprotect_rtp(&protected).await?, raw);

    Ok(())
}

#[tokio::test]
async fn test_replay_rejected_across_transport() -> Result<()> {
    let (client, server) = loopback_pair(Config::default(), Config::default())?;

    let (client_result, server_result) = tokio::join!(client.do_handshake(), server.do_handshake());
    client_result?;
    server_result?;

    let mut last = Bytes::new();
    for sequence_number in 1..=100u16 {
        let raw = test_rtp_packet(sequence_number)?;
        last = client.protect_rtp(&raw).await?;
        assert!(server.unprotect_rtp(&last).await.is_ok());
    }

    assert_eq!(
        server.unprotect_rtp(&last).await.err(),
        Some(Error::SrtpSsrcDuplicated(0xCAFEBABE, 100))
    );

    Ok(())
}

#[tokio::test]
async fn test_handshake_timeout() -> Result<()> {
    let client = DtlsSrtpTransport::new(
        DtlsRole::Client,
        Config {
            handshake_timeout: Duration::from_millis(500),
            retransmission_interval: Duration::from_millis(50),
            ..Default::default()
        },
    )?;

    // No handler and no inbound bytes: the client talks into the void.
    let started = std::time::Instant::now();
    let err = client.do_handshake().await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        Error::Handshake(handshake_err) => assert_eq!(handshake_err.tag(), "timeout"),
        other => panic!("expected handshake timeout, got {other}"),
    }
    assert!(
        elapsed >= Duration::from_millis(450) && elapsed < Duration::from_millis(900),
        "timeout fired after {elapsed:?}"
    );

    // The failed transport released its queue; media calls keep failing.
    assert_eq!(
        client.protect_rtp(&test_rtp_packet(1)?).await.err(),
        Some(Error::TransportClosed)
    );

    Ok(())
}

#[tokio::test]
async fn test_write_to_recv_stream_admits_only_dtls() -> Result<()> {
    let transport = DtlsSrtpTransport::new(DtlsRole::Client, Config::default())?;

    // RTP, RTCP and garbage never reach the engine queue.
    for pkt in [
        &[0x80u8, 96, 0, 1, 0, 0, 0, 0][..],
        &[0x80, 200, 0, 6, 0, 0, 0, 0][..],
        &[0x00, 0x01][..],
        &[][..],
    ] {
        assert_eq!(
            transport.write_to_recv_stream(pkt).await.err(),
            Some(Error::UnhandledPacketType)
        );
    }

    // A DTLS record is accepted.
    assert_eq!(transport.write_to_recv_stream(&[22, 254, 253, 0, 0]).await?, 5);
    Ok(())
}

#[tokio::test]
async fn test_protect_before_handshake_fails() -> Result<()> {
    let transport = DtlsSrtpTransport::new(DtlsRole::Client, Config::default())?;
    assert_eq!(
        transport.protect_rtp(&test_rtp_packet(1)?).await.err(),
        Some(Error::HandshakeNotComplete)
    );
    assert_eq!(
        transport.unprotect_rtcp(&[0u8; 32]).await.err(),
        Some(Error::HandshakeNotComplete)
    );
    Ok(())
}

#[tokio::test]
async fn test_rsa_only_client_rejected_by_ecdsa_server() -> Result<()> {
    // The server's self-signed certificate is ECDSA, so it advertises only
    // ECDHE-ECDSA suites. A client offering only ECDHE-RSA must be turned
    // away with a fatal alert.
    let server = Arc::new(DtlsSrtpTransport::new(DtlsRole::Server, Config::default())?);

    let client_endpoint = Arc::new(crate::endpoint::Endpoint::new(
        Duration::from_millis(100),
        1472,
        1408,
    ));

    {
        let to = Arc::clone(&server);
        client_endpoint.on_data_ready(Box::new(move |data: Bytes| {
            let to = Arc::clone(&to);
            Box::pin(async move {
                let _ = to.write_to_recv_stream(&data).await;
            })
        }));
    }
    {
        let to = Arc::clone(&client_endpoint);
        server.on_data_ready(Box::new(move |data: Bytes| {
            let to = Arc::clone(&to);
            Box::pin(async move {
                let _ = to.write_to_recv_stream(&data).await;
            })
        }));
    }

    let (alert_tx, mut alert_rx) = mpsc::channel(1);
    server.on_alert(Box::new(move |alert| {
        let alert_tx = alert_tx.clone();
        Box::pin(async move {
            let _ = alert_tx.send(alert).await;
        })
    }));

    let client_config = dtls::config::Config {
        certificates: vec![dtls::crypto::Certificate::generate_self_signed(vec![
            "client".to_owned(),
        ])?],
        cipher_suites: vec![
            dtls::cipher_suite::CipherSuiteId::Tls_Ecdhe_Rsa_With_Aes_128_Gcm_Sha256,
            dtls::cipher_suite::CipherSuiteId::Tls_Ecdhe_Rsa_With_Aes_256_Cbc_Sha,
        ],
        srtp_protection_profiles: vec![
            dtls::extension::extension_use_srtp::SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
        ],
        insecure_skip_verify: true,
        ..Default::default()
    };

    let raw_client = tokio::spawn(async move {
        let _ = tokio::time::timeout(
            Duration::from_secs(5),
            dtls::conn::DTLSConn::new(
                client_endpoint as Arc<dyn Conn + Send + Sync>,
                client_config,
                true,
                None,
            ),
        )
        .await;
    });

    let result = tokio::time::timeout(Duration::from_secs(10), server.do_handshake()).await;
    let err = result.expect("server handshake must resolve").unwrap_err();
    match err {
        Error::Handshake(HandshakeError::FatalAlert(description)) => {
            assert_eq!(description, AlertDescription::HandshakeFailure);
        }
        other => panic!("expected a fatal alert, got {other}"),
    }

    let alert = alert_rx.recv().await.expect("alert must be fanned out");
    assert_eq!(alert.level, AlertLevel::Fatal);
    assert_eq!(alert.description, AlertDescription::HandshakeFailure);

    let _ = raw_client.await;
    Ok(())
}
