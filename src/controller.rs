use std::{
    future::Future,
    sync::Arc,
};

use bytes::Bytes;
use futures::{
    AsyncRead,
    AsyncWrite,
};
use smol::lock::Mutex;

use codec::FrameType;
use message::{
    system,
    DeviceInfo,
    Method,
    Request,
    SystemCommand,
};

use crate::{
    error::Error,
    events::{
        self,
        EventKind,
        Subscription,
    },
    io::{
        Link,
        LinkConfig,
    },
    util,
};

/// First FETCH sent after connecting; the device treats it as the
/// CORECONF hello. CBOR `[0x7278]`.
const CORECONF_HELLO: u16 = 0x7278;

/// High-level handle to one device.
///
/// Constructed together with a pump future that must be spawned; the
/// controller is inert until the pump runs. Typed operations delegate to
/// [`Link`] underneath, so a `Controller` can be shared by reference
/// across tasks.
pub struct Controller<W> {
    link: Arc<Link<W>>,
    info: Mutex<Option<DeviceInfo>>,
}

impl<W> Controller<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new<R>(reader: R, writer: W) -> (Self, impl Future<Output = ()>)
    where
        R: AsyncRead + Unpin,
    {
        Self::with_config(reader, writer, LinkConfig::default())
    }

    pub fn with_config<R>(
        reader: R,
        writer: W,
        config: LinkConfig,
    ) -> (Self, impl Future<Output = ()>)
    where
        R: AsyncRead + Unpin,
    {
        let link = Arc::new(Link::new(writer, config));
        let pump = Arc::clone(&link).run(reader);

        let controller = Self {
            link,
            info: Mutex::new(None),
        };

        (controller, pump)
    }

    #[inline]
    pub fn link(&self) -> &Link<W> {
        &self.link
    }

    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        self.link.subscribe(kind)
    }

    /// Closes the link, rejecting everything in flight.
    pub fn shutdown(&self) {
        self.link.shutdown();
    }

    /// Pings the device and reports whether a pong came back in time.
    #[tracing::instrument(skip(self))]
    pub async fn ping(&self) -> bool {
        let mut pong = self.subscribe(EventKind::Pong);

        if self.link.send_frame(FrameType::Ping, &[]).await.is_err() {
            return false;
        }

        let wait = events::next_event(&mut pong);
        matches!(util::timeout(self.link.config().ping_timeout, wait).await, Some(Ok(_)))
    }

    /// Asks the device to identify itself. The parsed announcement is
    /// cached; later calls answer from the cache.
    #[tracing::instrument(skip(self), err)]
    pub async fn device_info(&self) -> Result<DeviceInfo, Error> {
        let mut cache = self.info.lock().await;
        if let Some(info) = cache.as_ref() {
            return Ok(info.clone());
        }

        let mut announce = self.subscribe(EventKind::Announcement);
        self.link.send_frame(FrameType::System, SystemCommand::Info.wire()).await?;

        let event = util::timeout(
            self.link.config().request_timeout,
            events::next_event(&mut announce),
        )
        .await
        .ok_or(Error::Timeout)?
        .map_err(|_| Error::ConnectionClosed)?;

        let info = DeviceInfo::parse(&event.payload);
        tracing::info!(device = %info, "device identified");

        *cache = Some(info.clone());
        Ok(info)
    }

    /// Persists the running configuration to flash.
    pub async fn save_config(&self) -> Result<(), Error> {
        self.system(SystemCommand::SaveConfig).await
    }

    /// Restores factory defaults. The device stays up; pair with
    /// [`Controller::reboot`] to start from them.
    pub async fn factory_reset(&self) -> Result<(), Error> {
        self.system(SystemCommand::FactoryReset).await
    }

    /// Reboots the device. No reply is expected; the link goes quiet
    /// until the device is back.
    pub async fn reboot(&self) -> Result<(), Error> {
        self.system(SystemCommand::Reboot).await
    }

    #[tracing::instrument(skip(self), err)]
    async fn system(&self, command: SystemCommand) -> Result<(), Error> {
        if !command.expects_response() {
            return self.link.send_frame(FrameType::System, command.wire()).await;
        }

        let mut replies = self.subscribe(EventKind::SystemResponse);
        self.link.send_frame(FrameType::System, command.wire()).await?;

        let event = util::timeout(
            self.link.config().request_timeout,
            events::next_event(&mut replies),
        )
        .await
        .ok_or(Error::Timeout)?
        .map_err(|_| Error::ConnectionClosed)?;

        if system::is_success(&event.payload) {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                reply: String::from_utf8_lossy(&event.payload).into_owned(),
            })
        }
    }

    pub async fn coap_get(&self, uri: &str) -> Result<Option<Bytes>, Error> {
        self.link.request(Request::new(Method::Get, uri, None)).await
    }

    pub async fn coap_post(&self, uri: &str, payload: Option<Bytes>) -> Result<Option<Bytes>, Error> {
        self.link.request(Request::new(Method::Post, uri, payload)).await
    }

    pub async fn coap_put(&self, uri: &str, payload: Option<Bytes>) -> Result<Option<Bytes>, Error> {
        self.link.request(Request::new(Method::Put, uri, payload)).await
    }

    pub async fn coap_delete(&self, uri: &str) -> Result<Option<Bytes>, Error> {
        self.link.request(Request::new(Method::Delete, uri, None)).await
    }

    pub async fn coap_fetch(&self, uri: &str, payload: Option<Bytes>) -> Result<Option<Bytes>, Error> {
        self.link.request(Request::new(Method::Fetch, uri, payload)).await
    }

    /// Brings a fresh connection up: confirms the device answers, runs the
    /// CORECONF hello (best effort; some firmware declines it) and fetches
    /// the announcement.
    #[tracing::instrument(skip(self), err)]
    pub async fn initialize(&self) -> Result<DeviceInfo, Error> {
        if !self.ping().await {
            return Err(Error::Timeout);
        }

        if let Err(error) = self.coreconf_hello().await {
            tracing::warn!(%error, "device declined the CORECONF hello");
        }

        self.device_info().await
    }

    async fn coreconf_hello(&self) -> Result<(), Error> {
        let mut hello = Vec::with_capacity(4);
        minicbor::Encoder::new(&mut hello).array(1)?.u16(CORECONF_HELLO)?;

        self.coap_fetch("c?d=a", Some(hello.into())).await?;
        Ok(())
    }
}
