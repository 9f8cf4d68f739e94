use futures::{
    AsyncRead,
    AsyncWrite,
};

/// Opens the switch's UART and hands back the byte-duplex pair
/// [`crate::Controller::new`] takes.
///
/// `tokio_serial` needs a tokio reactor; the compat wrappers supply one
/// and re-expose the stream through the `futures` I/O traits the core is
/// generic over, so callers stay runtime-agnostic.
#[tracing::instrument]
pub async fn connect_serial(
    path: String,
    baud: u32,
) -> eyre::Result<(impl AsyncRead + Unpin + Send, impl AsyncWrite + Unpin + Send)> {
    let open = async move {
        let builder = tokio_serial::new(&path, baud);
        let stream = tokio_serial::SerialStream::open(&builder)?;

        tracing::debug!("serial port open");
        Ok::<_, tokio_serial::Error>(stream)
    };

    let stream = async_compat::Compat::new(open).await?;
    Ok(smol::io::split(async_compat::Compat::new(stream)))
}
