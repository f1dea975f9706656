use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mcumgr_sim::{FaultKind, Faults, SimDevice, SimOptions};
use mcumgr_transfer::{
    CacheUpload, CoreDownload, DownloadSource, Downloader, EnvelopeUpload, FileDownload,
    FileUpload, ImageUpload, ResourceUpload, TransferError, UploadTarget, Uploader,
};
use mcumgr_transport::{StreamTransport, Transport};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cli::{Command, SimArgs};
use crate::config::Config;
use crate::progress;

pub async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::UploadImage {
            file,
            image,
            upgrade,
        } => upload(&config, &file, ImageUpload::new(image).with_upgrade(upgrade)).await,
        Command::UploadFile { local, remote } => {
            upload(&config, &local, FileUpload::new(remote)).await
        }
        Command::DownloadFile { remote, local } => {
            download(&config, FileDownload::new(remote), &local).await
        }
        Command::DownloadCore { local } => download(&config, CoreDownload, &local).await,
        Command::UploadEnvelope {
            file,
            defer_install,
        } => upload(&config, &file, EnvelopeUpload { defer_install }).await,
        Command::UploadResource { file, session_id } => {
            upload(&config, &file, ResourceUpload { session_id }).await
        }
        Command::UploadCache { file, target_id } => {
            upload(&config, &file, CacheUpload { target_id }).await
        }
        Command::Sim(args) => sim(args).await,
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    let transport = StreamTransport::connect(config.address.as_str(), config.transport.clone())
        .await
        .with_context(|| format!("connecting to {}", config.address))?;
    info!(addr = %config.address, mtu = config.transport.mtu, "connected");
    Ok(Arc::new(transport))
}

async fn upload<T: UploadTarget>(config: &Config, path: &Path, target: T) -> anyhow::Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let transport = connect(config).await?;

    let (tx, printer) = progress::spawn(
        path.display().to_string(),
        config.transfer.progress_interval(),
    );
    let result = Uploader::new(transport, target)
        .with_config(config.transfer.clone())
        .with_progress(tx)
        .upload(&data)
        .await;
    let _ = printer.await;

    result.map_err(describe)?;
    info!(bytes = data.len(), "upload finished");
    Ok(())
}

async fn download<S: DownloadSource>(config: &Config, source: S, path: &Path) -> anyhow::Result<()> {
    let transport = connect(config).await?;

    let (tx, printer) = progress::spawn(
        path.display().to_string(),
        config.transfer.progress_interval(),
    );
    let result = Downloader::new(transport, source)
        .with_config(config.transfer.clone())
        .with_progress(tx)
        .download()
        .await;
    let _ = printer.await;

    let data = result.map_err(describe)?;
    tokio::fs::write(path, &data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!(bytes = data.len(), path = %path.display(), "download finished");
    Ok(())
}

/// Tells device-side rejections apart from link failures in the message.
fn describe(e: TransferError) -> anyhow::Error {
    if let Some(code) = e.response_code() {
        anyhow::Error::new(e).context(format!("device rejected the transfer ({code})"))
    } else if e.is_transport_failure() {
        anyhow::Error::new(e).context("lost contact with the device")
    } else {
        anyhow::Error::new(e)
    }
}

async fn sim(args: SimArgs) -> anyhow::Result<()> {
    let faults = Faults {
        every_nth: args.drop_every,
        kind: args.drop_every.map(|_| FaultKind::Drop),
        max_delay: args.max_delay_ms.map(Duration::from_millis),
    };
    let device = Arc::new(SimDevice::new(SimOptions {
        read_chunk_size: args.read_chunk_size,
        strict_offsets: args.strict_offsets,
        group_errors: args.group_errors,
        faults,
        ..SimOptions::default()
    }));

    if let Some(core) = &args.core {
        let data = tokio::fs::read(core)
            .await
            .with_context(|| format!("reading {}", core.display()))?;
        device.set_core(Some(data));
    }

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;

    tokio::select! {
        result = mcumgr_sim::serve_tcp(device, listener) => result?,
        _ = tokio::signal::ctrl_c() => warn!("interrupted, shutting down"),
    }
    Ok(())
}
