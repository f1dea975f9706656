//! Upload then download through the simulated device, across window sizes,
//! payload sizes, framing schemes and faulty links.

use std::sync::Arc;
use std::time::Duration;

use mcumgr_protocol::{ResponseCode, Scheme};
use mcumgr_sim::{FaultKind, Faults, LoopbackTransport, SimDevice, SimOptions, serve};
use mcumgr_transfer::{
    Downloader, FileDownload, FileUpload, ImageUpload, TransferConfig, Uploader,
};
use mcumgr_transport::{StreamTransport, Transport, TransportConfig};
use rand::Rng;

fn payload(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    data
}

fn device(options: SimOptions) -> Arc<SimDevice> {
    Arc::new(SimDevice::new(options))
}

async fn file_roundtrip(transport: Arc<dyn Transport>, config: TransferConfig, data: &[u8]) -> Vec<u8> {
    Uploader::new(transport.clone(), FileUpload::new("/lfs/blob"))
        .with_config(config.clone())
        .upload(data)
        .await
        .unwrap();
    Downloader::new(transport, FileDownload::new("/lfs/blob"))
        .with_config(config)
        .download()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn roundtrip_across_windows_and_sizes() {
    for capacity in [1, 4, 16, 100] {
        for len in [1usize, 23, 24, 255, 256, 1000, 65_537] {
            let device = device(SimOptions::default());
            let transport = Arc::new(LoopbackTransport::new(device.clone(), 252, Scheme::Standard));
            let config = TransferConfig::default().with_window_capacity(capacity);
            let data = payload(len);

            let got = file_roundtrip(transport.clone(), config, &data).await;
            assert_eq!(got, data, "capacity {capacity} len {len}");
            assert_eq!(device.file("/lfs/blob").unwrap(), data);
            assert!(transport.sent_frames().iter().all(|f| f.len() <= 252));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn roundtrip_over_a_megabyte() {
    for capacity in [1, 4, 16, 100] {
        let device = device(SimOptions {
            read_chunk_size: 1024,
            ..SimOptions::default()
        });
        let transport = Arc::new(LoopbackTransport::new(device, 2048, Scheme::Standard));
        let data = payload(1_000_001);
        let got = file_roundtrip(
            transport,
            TransferConfig::default().with_window_capacity(capacity),
            &data,
        )
        .await;
        assert_eq!(got, data, "capacity {capacity}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn image_of_a_million_bytes_with_wide_window() {
    let device = device(SimOptions::default());
    let transport = Arc::new(LoopbackTransport::new(device.clone(), 512, Scheme::Standard));
    let data = payload(1_000_000);

    Uploader::new(transport, ImageUpload::new(1))
        .with_config(TransferConfig::default().with_window_capacity(100))
        .upload(&data)
        .await
        .unwrap();

    assert_eq!(device.image(1).unwrap(), data);
}

#[tokio::test]
async fn coap_wrapped_scheme() {
    let device = device(SimOptions::default());
    let transport = Arc::new(LoopbackTransport::new(device, 128, Scheme::CoapWrapped));
    let data = payload(5000);
    let got = file_roundtrip(
        transport.clone(),
        TransferConfig::default().with_window_capacity(4),
        &data,
    )
    .await;
    assert_eq!(got, data);
    assert!(transport.sent_frames().iter().all(|f| f.len() <= 128));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reordered_completions() {
    let device = device(SimOptions {
        faults: Faults {
            max_delay: Some(Duration::from_millis(5)),
            ..Faults::default()
        },
        ..SimOptions::default()
    });
    let transport = Arc::new(LoopbackTransport::new(device, 252, Scheme::Standard));
    let data = payload(40_000);
    let got = file_roundtrip(
        transport,
        TransferConfig::default().with_window_capacity(16),
        &data,
    )
    .await;
    assert_eq!(got, data);
}

#[tokio::test]
async fn transient_protocol_errors_are_retried() {
    let device = device(SimOptions {
        faults: Faults {
            every_nth: Some(7),
            kind: Some(FaultKind::Code(ResponseCode::Busy)),
            max_delay: None,
        },
        ..SimOptions::default()
    });
    let transport = Arc::new(LoopbackTransport::new(device, 252, Scheme::Standard));
    let data = payload(20_000);
    let got = file_roundtrip(
        transport,
        TransferConfig::default().with_window_capacity(8),
        &data,
    )
    .await;
    assert_eq!(got, data);
}

#[tokio::test]
async fn dropped_responses_are_retried() {
    let device = device(SimOptions {
        faults: Faults {
            every_nth: Some(5),
            kind: Some(FaultKind::Drop),
            max_delay: None,
        },
        ..SimOptions::default()
    });
    let transport = Arc::new(LoopbackTransport::new(device, 252, Scheme::Standard));
    let data = payload(20_000);
    let got = file_roundtrip(
        transport,
        TransferConfig::default().with_window_capacity(8),
        &data,
    )
    .await;
    assert_eq!(got, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_transport_against_served_device() {
    let device = device(SimOptions {
        faults: Faults {
            max_delay: Some(Duration::from_millis(3)),
            ..Faults::default()
        },
        ..SimOptions::default()
    });
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(serve(device.clone(), server));

    let transport: Arc<dyn Transport> = Arc::new(StreamTransport::new(
        client,
        TransportConfig {
            mtu: 512,
            ..TransportConfig::default()
        },
    ));
    let data = payload(30_000);
    let got = file_roundtrip(
        transport,
        TransferConfig::default().with_window_capacity(16),
        &data,
    )
    .await;
    assert_eq!(got, data);
    assert_eq!(device.file("/lfs/blob").unwrap(), data);
}
