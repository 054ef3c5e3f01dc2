//! Full-stack integration test: real TCP sockets into a running [`Server`], exercising
//! channel framing, the controller protocol, the worker thread, and the combiner
//! together.

use ils_aggregator::config::Settings;
use ils_aggregator::protocol;
use ils_aggregator::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};

fn unique_base_port() -> u16 {
    20000 + (std::process::id() % 5000) as u16
}

async fn send_channel_frame(stream: &mut TcpStream, pairs: &[(i16, i16)]) {
    let payload = protocol::encode_iq_i16_payload(pairs);
    let header = protocol::encode_channel_frame_header(payload.len() as u64, false);
    stream.write_all(&header).await.unwrap();
    stream.write_all(&payload).await.unwrap();
}

#[tokio::test]
async fn channel_frames_combine_into_controller_output() {
    let base = unique_base_port();
    let mut settings = Settings::default();
    settings.bind_address = "127.0.0.1".to_string();
    settings.base_channel_port = base;
    settings.controller_port = base + 10;
    settings.channel_amount = 2;
    settings.packet_size = 4;
    settings.carrier_threshold = 1000.0;

    let server = Server::new(settings.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(async move {
        server
            .run(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    // Let the listeners finish binding before connecting.
    sleep(Duration::from_millis(100)).await;

    let mut controller = TcpStream::connect(("127.0.0.1", settings.controller_port))
        .await
        .unwrap();
    let mut greeting = [0u8; 1];
    controller.read_exact(&mut greeting).await.unwrap();
    assert_eq!(greeting[0], settings.channel_amount);

    let shifts = vec![0.0, 0.0];
    let payload = protocol::encode_phase_shift_payload(&shifts);
    controller.write_all(&1u32.to_le_bytes()).await.unwrap();
    controller.write_all(&payload).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    let mut reference = TcpStream::connect(("127.0.0.1", settings.channel_port(0)))
        .await
        .unwrap();
    let mut auxiliary = TcpStream::connect(("127.0.0.1", settings.channel_port(1)))
        .await
        .unwrap();

    send_channel_frame(&mut reference, &[(1500, 0), (1500, 0), (1500, 0), (1500, 0)]).await;
    sleep(Duration::from_millis(50)).await;

    // Matches the reference's onset with a two-sample delay, so the channel locks with
    // offset = -2 as in the aux-lock scenario.
    send_channel_frame(&mut auxiliary, &[(0, 0), (0, 0), (1500, 0), (1500, 0)]).await;
    sleep(Duration::from_millis(50)).await;

    // A second reference batch triggers the combiner now that the auxiliary is locked.
    send_channel_frame(&mut reference, &[(1500, 0), (1500, 0), (1500, 0), (1500, 0)]).await;

    let mut header = [0u8; 5];
    timeout(Duration::from_secs(2), controller.read_exact(&mut header))
        .await
        .expect("timed out waiting for combined output packet")
        .unwrap();
    let payload_complex_count = u32::from_le_bytes(header[0..4].try_into().unwrap());
    assert_eq!(payload_complex_count, 4);
    assert_eq!(header[4], 0, "phase shift never changed from the zero baseline");

    let mut body = vec![0u8; payload_complex_count as usize * 16];
    controller.read_exact(&mut body).await.unwrap();

    let _ = shutdown_tx.send(());
    let _ = server_task.await;
}

#[tokio::test]
async fn a_second_connection_to_an_occupied_channel_is_refused() {
    let base = unique_base_port() + 1;
    let mut settings = Settings::default();
    settings.bind_address = "127.0.0.1".to_string();
    settings.base_channel_port = base;
    settings.controller_port = base + 10;
    settings.channel_amount = 1;

    let server = Server::new(settings.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(async move {
        server
            .run(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });
    sleep(Duration::from_millis(100)).await;

    let _incumbent = TcpStream::connect(("127.0.0.1", settings.channel_port(0)))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let mut challenger = TcpStream::connect(("127.0.0.1", settings.channel_port(0)))
        .await
        .unwrap();
    let mut buf = [0u8; 1];
    let result = timeout(Duration::from_millis(300), challenger.read(&mut buf)).await;
    // The server closes the challenger without writing anything; either the read
    // times out waiting for a byte that never comes, or it observes EOF (n == 0).
    match result {
        Ok(Ok(0)) => {}
        Err(_) => {}
        other => panic!("expected the rejected connection to see EOF or nothing, got {other:?}"),
    }

    let _ = shutdown_tx.send(());
    let _ = server_task.await;
}
