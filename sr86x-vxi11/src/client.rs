//! VXI-11 core channel client
//!
//! Every operation is one ONC RPC exchange: the call header and parameters
//! are packed behind a 4-byte record marker slot, sent as a single record,
//! and exactly one reply record is read back and checked before its result
//! fields are copied into the [`DeviceResponse`] mirror.
//!
//! # Connection Flow
//!
//! 1. **PortMapper**: GETPORT on port 111 resolves the core channel port
//!    (skipped when the port is known)
//! 2. **Core**: a fresh stream to the core port, then `create_link`
//! 3. **Ready**: link-dependent operations may be used until `destroy_link`
//!    or a transport failure invalidates the link

use crate::config::Vxi11Config;
use crate::error_code::device_error_message;
use crate::response::DeviceResponse;
use crate::{BUFF_SIZE, DATA_SIZE};
use sr86x_core::constants::{
    device_flags, device_proc, DEVICE_CORE_PROG, DEVICE_CORE_VERS, IPPROTO_TCP,
    PMAPPROC_GETPORT, PORTMAPPER_PORT, PORTMAPPER_PROG, PORTMAPPER_VERS, RECORD_MARKER_SIZE,
};
use sr86x_core::{ReplyError, Sr86xError, Sr86xResult};
use sr86x_rpc::{CallHeader, RecordMarker, ReplyHeader};
use sr86x_transport::{StreamAccessor, TransportFactory, TransportLayer};
use sr86x_xdr::{XdrPacker, XdrUnpacker};

/// Status notification: `(ok, connect_finished)`
///
/// Fired with `(result, true)` when [`Vxi11Client::connect_to_device`]
/// finishes and with `(false, false)` when an open stream is closed.
pub type StatusCallback = Box<dyn Fn(bool, bool) + Send + Sync>;

/// Bring-up phase of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectPhase {
    /// No bring-up in progress
    #[default]
    None,
    /// Asking the portmapper for the core port
    PortMapper,
    /// Connecting to the core channel and creating the link
    Core,
}

/// One XDR call parameter
enum Arg<'a> {
    Int(i32),
    Uint(u32),
    Bool(bool),
    Opaque(&'a [u8]),
}

/// VXI-11 client bound to one instrument through a [`TransportFactory`]
pub struct Vxi11Client<F: TransportFactory> {
    factory: F,
    stream: Option<F::Transport>,
    config: Vxi11Config,
    response: DeviceResponse,
    link_id: i32,
    xid: u32,
    program: u32,
    version: u32,
    phase: ConnectPhase,
    tx: Vec<u8>,
    rx: Vec<u8>,
    callback: Option<StatusCallback>,
    silence: bool,
}

impl<F: TransportFactory> Vxi11Client<F> {
    pub fn new(factory: F, config: Vxi11Config) -> Self {
        Self {
            factory,
            stream: None,
            config,
            response: DeviceResponse::default(),
            link_id: -1,
            xid: 0,
            program: 0,
            version: 0,
            phase: ConnectPhase::None,
            tx: vec![0; BUFF_SIZE],
            rx: vec![0; BUFF_SIZE],
            callback: None,
            silence: false,
        }
    }

    pub fn set_callback(&mut self, callback: StatusCallback) {
        self.callback = Some(callback);
    }

    pub fn config(&self) -> &Vxi11Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Vxi11Config {
        &mut self.config
    }

    /// Mirror of the most recent reply
    pub fn response(&self) -> &DeviceResponse {
        &self.response
    }

    /// Current link id, -1 when there is no link
    pub fn link_id(&self) -> i32 {
        self.link_id
    }

    pub fn phase(&self) -> ConnectPhase {
        self.phase
    }

    /// Whether a device link is established
    pub fn connection_ok(&self) -> bool {
        self.link_id != -1
    }

    /// Whether a stream is open
    pub fn can_write(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Text for the device error code of the last reply
    pub fn last_error(&self) -> &'static str {
        device_error_message(self.response.error)
    }

    fn notify(&self, ok: bool, finished: bool) {
        if let Some(callback) = &self.callback {
            callback(ok, finished);
        }
    }

    /// Close the stream and invalidate the link
    ///
    /// Fires the status callback with `(false, false)` if a stream was open.
    pub async fn close_stream(&mut self) {
        let had_stream = self.stream.is_some();
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close().await;
        }
        self.link_id = -1;
        self.response.lid = -1;

        if had_stream && !self.silence {
            self.notify(false, false);
        }
    }

    async fn close_stream_silently(&mut self) {
        let silence = std::mem::replace(&mut self.silence, true);
        self.close_stream().await;
        self.silence = silence;
    }

    async fn open_stream(&mut self, port: u16) -> Sr86xResult<()> {
        self.close_stream_silently().await;
        let mut stream = self.factory.create(port)?;
        stream.open().await?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Connect to the instrument and create a device link
    ///
    /// Any existing link is destroyed first without notification. With
    /// `port` (or a configured core port) the portmapper phase is skipped.
    /// The status callback receives `(ok, true)` when bring-up ends.
    pub async fn connect_to_device(&mut self, port: Option<u16>, lock_device: bool) -> Sr86xResult<()> {
        self.config.lock_device = lock_device;

        if self.link_id != -1 || self.stream.is_some() {
            let silence = std::mem::replace(&mut self.silence, true);
            if self.link_id != -1 {
                let _ = self.destroy_link().await;
            }
            self.close_stream().await;
            self.silence = silence;
        }

        let result = self.bring_up(port.or(self.config.core_port)).await;
        self.phase = ConnectPhase::None;
        if let Err(e) = &result {
            log::warn!("VXI-11 connect failed: {}", e);
        }
        self.notify(result.is_ok(), true);
        result
    }

    async fn bring_up(&mut self, port: Option<u16>) -> Sr86xResult<()> {
        let port = match port {
            Some(port) => {
                log::info!("VXI-11 core port {} specified by user", port);
                port
            }
            None => {
                self.phase = ConnectPhase::PortMapper;
                self.get_port().await?
            }
        };

        self.phase = ConnectPhase::Core;
        self.open_stream(port).await?;
        self.create_link().await
    }

    /// Ask the portmapper for the VXI-11 core channel TCP port
    pub async fn get_port(&mut self) -> Sr86xResult<u16> {
        self.open_stream(PORTMAPPER_PORT).await?;
        let result = self.query_core_port().await;
        self.close_stream_silently().await;
        result
    }

    async fn query_core_port(&mut self) -> Sr86xResult<u16> {
        self.set_program(PORTMAPPER_PROG, PORTMAPPER_VERS);
        let len = self
            .call(
                PMAPPROC_GETPORT,
                &[
                    Arg::Uint(DEVICE_CORE_PROG),
                    Arg::Uint(DEVICE_CORE_VERS),
                    Arg::Uint(IPPROTO_TCP),
                    Arg::Uint(0),
                ],
            )
            .await?;

        let mut reply = open_reply(&self.rx, len, self.xid)?;
        let port = reply.unpack_u32();
        finish(&reply)?;

        match u16::try_from(port) {
            Ok(port) if port != 0 => {
                log::info!("VXI-11 core port = {}", port);
                Ok(port)
            }
            _ => Err(Sr86xError::Protocol(format!(
                "portmapper returned no usable core port ({})",
                port
            ))),
        }
    }

    /// Create the device link; does nothing when a link already exists
    pub async fn create_link(&mut self) -> Sr86xResult<()> {
        if self.link_id != -1 {
            return Ok(());
        }

        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        let device_name = self.config.device_name.clone();
        let len = self
            .call(
                device_proc::CREATE_LINK,
                &[
                    Arg::Int(self.config.client_id),
                    Arg::Bool(self.config.lock_device),
                    Arg::Uint(self.config.lock_timeout),
                    Arg::Opaque(device_name.as_bytes()),
                ],
            )
            .await?;

        let mut reply = open_reply(&self.rx, len, self.xid)?;
        self.response.error = reply.unpack_i32();
        self.response.lid = reply.unpack_i32();
        self.response.abort_port = reply.unpack_i32() as u16;
        let max_recv_size = reply.unpack_u32() as usize;
        finish(&reply)?;

        if self.response.error != 0 {
            self.link_id = -1;
            self.response.lid = -1;
            self.response.max_recv_size = DATA_SIZE;
            return Err(self.device_error("create_link"));
        }

        self.link_id = self.response.lid;
        self.response.max_recv_size = max_recv_size.min(DATA_SIZE);
        log::info!("VXI-11 link id {}", self.link_id);
        Ok(())
    }

    /// Send `data` to the device as one complete message
    ///
    /// Fails without any I/O when there is no link or the payload exceeds
    /// the device's advertised maximum. The end-of-message flag is set for
    /// this call only.
    pub async fn device_write(&mut self, data: &str) -> Sr86xResult<()> {
        self.require_link("device_write")?;
        let payload = data.as_bytes();
        if payload.len() > self.response.max_recv_size {
            log::warn!("device_write too long ({} bytes)", payload.len());
            return Err(Sr86xError::PayloadTooLarge {
                len: payload.len(),
                max: self.response.max_recv_size,
            });
        }

        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        let len = self
            .call(
                device_proc::DEVICE_WRITE,
                &[
                    Arg::Int(self.link_id),
                    Arg::Uint(self.config.io_timeout),
                    Arg::Uint(self.config.lock_timeout),
                    Arg::Uint(self.config.flags | device_flags::END),
                    Arg::Opaque(payload),
                ],
            )
            .await?;

        let mut reply = open_reply(&self.rx, len, self.xid)?;
        self.response.error = reply.unpack_i32();
        self.response.size = reply.unpack_u32();
        finish(&reply)?;

        if self.response.error != 0 {
            return Err(self.device_error("device_write"));
        }
        if self.response.size as usize != payload.len() {
            return Err(Sr86xError::Protocol(format!(
                "device_write accepted {} of {} bytes",
                self.response.size,
                payload.len()
            )));
        }
        Ok(())
    }

    /// Read up to [`DATA_SIZE`] bytes of device output
    pub async fn device_read(&mut self) -> Sr86xResult<String> {
        self.require_link("device_read")?;

        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        let len = self
            .call(
                device_proc::DEVICE_READ,
                &[
                    Arg::Int(self.link_id),
                    Arg::Uint(DATA_SIZE as u32),
                    Arg::Uint(self.config.io_timeout),
                    Arg::Uint(self.config.lock_timeout),
                    Arg::Uint(self.config.flags),
                    Arg::Int(i32::from(self.config.term_char)),
                ],
            )
            .await?;

        let mut reply = open_reply(&self.rx, len, self.xid)?;
        self.response.error = reply.unpack_i32();
        self.response.reason = reply.unpack_i32();
        let data = reply.unpack_opaque();
        finish(&reply)?;
        self.response.data = String::from_utf8_lossy(data).into_owned();

        if self.response.error != 0 {
            return Err(self.device_error("device_read"));
        }
        Ok(self.response.data.clone())
    }

    /// Write a query and read its answer
    pub async fn query(&mut self, command: &str) -> Sr86xResult<String> {
        self.device_write(command).await?;
        self.device_read().await
    }

    /// Read the status byte
    pub async fn device_readstb(&mut self) -> Sr86xResult<u8> {
        self.require_link("device_readstb")?;
        let len = self.generic_call(device_proc::DEVICE_READSTB).await?;

        let mut reply = open_reply(&self.rx, len, self.xid)?;
        self.response.error = reply.unpack_i32();
        let stb = reply.unpack_u32();
        finish(&reply)?;

        if self.response.error != 0 {
            return Err(self.device_error("device_readstb"));
        }
        self.response.stb = stb as u8;
        Ok(self.response.stb)
    }

    pub async fn device_trigger(&mut self) -> Sr86xResult<()> {
        self.require_link("device_trigger")?;
        let len = self.generic_call(device_proc::DEVICE_TRIGGER).await?;
        self.error_only_reply(len, "device_trigger")
    }

    pub async fn device_clear(&mut self) -> Sr86xResult<()> {
        self.require_link("device_clear")?;
        let len = self.generic_call(device_proc::DEVICE_CLEAR).await?;
        self.error_only_reply(len, "device_clear")
    }

    pub async fn device_remote(&mut self) -> Sr86xResult<()> {
        self.require_link("device_remote")?;
        let len = self.generic_call(device_proc::DEVICE_REMOTE).await?;
        self.error_only_reply(len, "device_remote")
    }

    pub async fn device_local(&mut self) -> Sr86xResult<()> {
        self.require_link("device_local")?;
        let len = self.generic_call(device_proc::DEVICE_LOCAL).await?;
        self.error_only_reply(len, "device_local")
    }

    pub async fn device_lock(&mut self) -> Sr86xResult<()> {
        self.require_link("device_lock")?;
        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        let len = self
            .call(
                device_proc::DEVICE_LOCK,
                &[
                    Arg::Int(self.link_id),
                    Arg::Uint(self.config.flags),
                    Arg::Uint(self.config.lock_timeout),
                ],
            )
            .await?;
        self.error_only_reply(len, "device_lock")
    }

    pub async fn device_unlock(&mut self) -> Sr86xResult<()> {
        self.require_link("device_unlock")?;
        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        let len = self
            .call(device_proc::DEVICE_UNLOCK, &[Arg::Int(self.link_id)])
            .await?;
        self.error_only_reply(len, "device_unlock")
    }

    /// Destroy the device link and close the stream
    pub async fn destroy_link(&mut self) -> Sr86xResult<()> {
        self.require_link("destroy_link")?;
        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        let len = self
            .call(device_proc::DESTROY_LINK, &[Arg::Int(self.link_id)])
            .await?;
        self.error_only_reply(len, "destroy_link")?;

        self.close_stream().await;
        log::info!("VXI-11 link destroyed");
        Ok(())
    }

    fn set_program(&mut self, program: u32, version: u32) {
        self.program = program;
        self.version = version;
    }

    fn require_link(&self, operation: &str) -> Sr86xResult<()> {
        if self.link_id == -1 {
            log::warn!("{} without a valid link", operation);
            return Err(Sr86xError::NoLink);
        }
        Ok(())
    }

    fn device_error(&self, operation: &str) -> Sr86xError {
        let message = self.last_error();
        log::warn!("{} error {}: {}", operation, self.response.error, message);
        Sr86xError::Device {
            code: self.response.error,
            message,
        }
    }

    /// Call taking the generic link/flags/lock_timeout/io_timeout parameters
    async fn generic_call(&mut self, procedure: u32) -> Sr86xResult<usize> {
        self.set_program(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
        self.call(
            procedure,
            &[
                Arg::Int(self.link_id),
                Arg::Uint(self.config.flags),
                Arg::Uint(self.config.lock_timeout),
                Arg::Uint(self.config.io_timeout),
            ],
        )
        .await
    }

    fn error_only_reply(&mut self, len: usize, operation: &str) -> Sr86xResult<()> {
        let mut reply = open_reply(&self.rx, len, self.xid)?;
        self.response.error = reply.unpack_i32();
        finish(&reply)?;
        if self.response.error != 0 {
            return Err(self.device_error(operation));
        }
        Ok(())
    }

    /// Send one call record and receive one reply record
    ///
    /// Returns the reply length, marker excluded. A transport or framing
    /// failure closes the stream.
    async fn call(&mut self, procedure: u32, args: &[Arg<'_>]) -> Sr86xResult<usize> {
        self.xid = self.xid.wrapping_add(1);
        let header = CallHeader::new(self.xid, self.program, self.version, procedure);

        let body_len = {
            let mut packer = XdrPacker::new(&mut self.tx[RECORD_MARKER_SIZE..]);
            header.pack(&mut packer);
            for arg in args {
                match *arg {
                    Arg::Int(v) => packer.pack_i32(v),
                    Arg::Uint(v) => packer.pack_u32(v),
                    Arg::Bool(v) => packer.pack_bool(v),
                    Arg::Opaque(v) => packer.pack_opaque(v),
                }
            }
            if let Some(err) = packer.error() {
                return Err(err.into());
            }
            packer.actual_size()
        };
        self.tx[..RECORD_MARKER_SIZE]
            .copy_from_slice(&RecordMarker::last(body_len as u32).encode());
        let record_len = RECORD_MARKER_SIZE + body_len;
        log::debug!("VXI-11 call xid {} proc {} ({} bytes)", self.xid, procedure, record_len);

        let result = exchange(self.stream.as_mut(), &self.tx[..record_len], &mut self.rx).await;
        if let Err(e) = &result {
            if e.is_transport() || is_framing_error(e) {
                log::warn!("VXI-11 stream error: {}", e);
                self.close_stream().await;
            }
        }
        result
    }
}

/// Reply framing failures leave the rest of the record unread on the stream
fn is_framing_error(err: &Sr86xError) -> bool {
    matches!(
        err,
        Sr86xError::Rpc(ReplyError::NotFinalFragment(_)) | Sr86xError::PayloadTooLarge { .. }
    )
}

/// Write `request` and read back one final-fragment reply into `rx`
async fn exchange<S: StreamAccessor>(
    stream: Option<&mut S>,
    request: &[u8],
    rx: &mut [u8],
) -> Sr86xResult<usize> {
    let stream = stream.ok_or_else(|| {
        Sr86xError::Connection(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "VXI-11 stream not open",
        ))
    })?;

    stream.write_all(request).await?;
    stream.flush().await?;

    stream.read_exact(&mut rx[..RECORD_MARKER_SIZE]).await?;
    let word = u32::from_be_bytes([rx[0], rx[1], rx[2], rx[3]]);
    let marker = RecordMarker::from_u32(word);
    if !marker.last {
        return Err(ReplyError::NotFinalFragment(word).into());
    }

    let len = marker.length as usize;
    if len + RECORD_MARKER_SIZE > rx.len() {
        return Err(Sr86xError::PayloadTooLarge {
            len: len + RECORD_MARKER_SIZE,
            max: rx.len(),
        });
    }
    stream
        .read_exact(&mut rx[RECORD_MARKER_SIZE..RECORD_MARKER_SIZE + len])
        .await?;
    Ok(len)
}

/// Check the reply envelope and position an unpacker at the result body
fn open_reply(rx: &[u8], len: usize, xid: u32) -> Sr86xResult<XdrUnpacker<'_>> {
    let mut unpacker = XdrUnpacker::new(&rx[RECORD_MARKER_SIZE..RECORD_MARKER_SIZE + len]);
    if let Err(e) = ReplyHeader::unpack(&mut unpacker, xid) {
        log::warn!("RPC reply rejected: {}", e);
        return Err(e.into());
    }
    Ok(unpacker)
}

fn finish(reply: &XdrUnpacker<'_>) -> Sr86xResult<()> {
    match reply.error() {
        Some(err) => Err(ReplyError::Malformed(err).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sr86x_core::constants::LAST_FRAGMENT;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Script {
        opened: Vec<u16>,
        writes: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
        current: VecDeque<u8>,
    }

    #[derive(Clone, Default)]
    struct ScriptedFactory {
        script: Arc<Mutex<Script>>,
    }

    struct ScriptedTransport {
        script: Arc<Mutex<Script>>,
        port: u16,
        closed: bool,
    }

    impl TransportFactory for ScriptedFactory {
        type Transport = ScriptedTransport;

        fn create(&self, port: u16) -> Sr86xResult<ScriptedTransport> {
            Ok(ScriptedTransport {
                script: self.script.clone(),
                port,
                closed: true,
            })
        }
    }

    #[async_trait]
    impl StreamAccessor for ScriptedTransport {
        async fn set_timeout(&mut self, _timeout: Option<Duration>) -> Sr86xResult<()> {
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Sr86xResult<usize> {
            let mut script = self.script.lock().unwrap();
            if script.current.is_empty() {
                match script.replies.pop_front() {
                    Some(reply) => script.current.extend(reply),
                    None => return Ok(0),
                }
            }
            let n = buf.len().min(script.current.len());
            for (slot, byte) in buf.iter_mut().zip(script.current.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        async fn write(&mut self, buf: &[u8]) -> Sr86xResult<usize> {
            self.script.lock().unwrap().writes.push(buf.to_vec());
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Sr86xResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }

        async fn close(&mut self) -> Sr86xResult<()> {
            self.closed = true;
            self.script.lock().unwrap().current.clear();
            Ok(())
        }
    }

    #[async_trait]
    impl TransportLayer for ScriptedTransport {
        async fn open(&mut self) -> Sr86xResult<()> {
            self.script.lock().unwrap().opened.push(self.port);
            self.closed = false;
            Ok(())
        }
    }

    fn words(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn to_words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Accepted, successful reply to `xid` carrying `result`
    fn reply(xid: u32, result: &[u32]) -> Vec<u8> {
        let mut body = vec![xid, 1, 0, 0, 0, 0];
        body.extend_from_slice(result);
        let mut record = words(&[LAST_FRAGMENT | (body.len() as u32 * 4)]);
        record.extend(words(&body));
        record
    }

    type Events = Arc<Mutex<Vec<(bool, bool)>>>;

    fn client(replies: Vec<Vec<u8>>) -> (Vxi11Client<ScriptedFactory>, ScriptedFactory, Events) {
        let factory = ScriptedFactory::default();
        factory.script.lock().unwrap().replies = replies.into();
        let events: Events = Arc::default();
        let sink = events.clone();
        let mut client = Vxi11Client::new(factory.clone(), Vxi11Config::default());
        client.set_callback(Box::new(move |ok, finished| {
            sink.lock().unwrap().push((ok, finished));
        }));
        (client, factory, events)
    }

    /// Client linked as lid 7 through a user-given port; the link call is xid 1
    async fn linked(mut replies: Vec<Vec<u8>>) -> (Vxi11Client<ScriptedFactory>, ScriptedFactory, Events) {
        replies.insert(0, reply(1, &[0, 7, 0, 4096]));
        let (mut client, factory, events) = client(replies);
        client.connect_to_device(Some(1024), false).await.unwrap();
        factory.script.lock().unwrap().writes.clear();
        events.lock().unwrap().clear();
        (client, factory, events)
    }

    #[tokio::test]
    async fn test_write_without_link_does_no_io() {
        let (mut client, factory, _) = client(vec![]);
        assert!(matches!(client.device_write("*IDN?").await, Err(Sr86xError::NoLink)));
        assert!(matches!(client.device_read().await, Err(Sr86xError::NoLink)));
        assert!(matches!(client.destroy_link().await, Err(Sr86xError::NoLink)));
        let script = factory.script.lock().unwrap();
        assert!(script.writes.is_empty());
        assert!(script.opened.is_empty());
    }

    #[tokio::test]
    async fn test_connect_through_portmapper() {
        let (mut client, factory, events) =
            client(vec![reply(1, &[1024]), reply(2, &[0, 7, 0, 4096])]);
        client.connect_to_device(None, false).await.unwrap();

        assert!(client.connection_ok());
        assert_eq!(client.link_id(), 7);
        assert_eq!(client.response().max_recv_size, DATA_SIZE);
        assert_eq!(client.phase(), ConnectPhase::None);
        assert_eq!(*events.lock().unwrap(), vec![(true, true)]);

        let script = factory.script.lock().unwrap();
        assert_eq!(script.opened, vec![111, 1024]);
        assert_eq!(
            to_words(&script.writes[0]),
            vec![
                LAST_FRAGMENT | 56, 1, 0, 2, 100_000, 2, 3, 0, 0, 0, 0,
                395_183, 1, 6, 0
            ]
        );
        // create_link: client id, lock flag, lock timeout, "inst0"
        let link_call = to_words(&script.writes[1]);
        assert_eq!(link_call[0], LAST_FRAGMENT | 64);
        assert_eq!(&link_call[1..7], &[2, 0, 2, 395_183, 1, 10]);
        assert_eq!(&link_call[11..15], &[123_456, 0, 8000, 5]);
        assert_eq!(&script.writes[1][60..68], b"inst0\0\0\0");
    }

    #[tokio::test]
    async fn test_user_port_skips_portmapper() {
        let (client, factory, _) = linked(vec![]).await;
        assert_eq!(client.link_id(), 7);
        assert_eq!(factory.script.lock().unwrap().opened, vec![1024]);
    }

    #[tokio::test]
    async fn test_create_link_error_resets_link() {
        let (mut client, _, events) = client(vec![reply(1, &[11, 9, 0, 1024])]);
        let err = client.connect_to_device(Some(1024), true).await.unwrap_err();
        assert!(matches!(
            err,
            Sr86xError::Device { code: 11, message: "Device locked by another link" }
        ));
        assert_eq!(client.link_id(), -1);
        assert_eq!(client.last_error(), "Device locked by another link");
        assert_eq!(*events.lock().unwrap(), vec![(false, true)]);
    }

    #[tokio::test]
    async fn test_device_write_sets_end_flag() {
        let (mut client, factory, _) = linked(vec![reply(2, &[0, 5])]).await;
        client.device_write("*IDN?").await.unwrap();

        let script = factory.script.lock().unwrap();
        let call = to_words(&script.writes[0]);
        assert_eq!(call[6], 11);
        assert_eq!(&call[11..16], &[7, 8000, 8000, 0x08, 5]);
        assert_eq!(&script.writes[0][64..69], b"*IDN?");
        assert_eq!(client.config().flags, 0);
    }

    #[tokio::test]
    async fn test_device_write_short_count_fails() {
        let (mut client, _, _) = linked(vec![reply(2, &[0, 3])]).await;
        assert!(matches!(
            client.device_write("*IDN?").await,
            Err(Sr86xError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_device_write_too_long() {
        let (mut client, factory, _) = linked(vec![]).await;
        let long = "x".repeat(DATA_SIZE + 1);
        assert!(matches!(
            client.device_write(&long).await,
            Err(Sr86xError::PayloadTooLarge { .. })
        ));
        assert!(factory.script.lock().unwrap().writes.is_empty());
    }

    #[tokio::test]
    async fn test_device_read_returns_data() {
        let mut result = vec![0, 4, 9];
        result.extend(to_words(b"SR865,00\n\0\0\0"));
        let (mut client, factory, _) = linked(vec![reply(2, &result)]).await;

        assert_eq!(client.device_read().await.unwrap(), "SR865,00\n");
        assert_eq!(client.response().reason, 4);

        let call = to_words(&factory.script.lock().unwrap().writes[0]);
        assert_eq!(call[6], 12);
        assert_eq!(&call[11..17], &[7, 786, 8000, 8000, 0, 0]);
    }

    #[tokio::test]
    async fn test_device_read_error() {
        let (mut client, _, _) = linked(vec![reply(2, &[15, 0, 0])]).await;
        assert!(matches!(
            client.device_read().await,
            Err(Sr86xError::Device { code: 15, message: "I/O timeout" })
        ));
        assert!(client.connection_ok());
    }

    #[tokio::test]
    async fn test_readstb_and_generic_calls() {
        let (mut client, factory, _) =
            linked(vec![reply(2, &[0, 0x50]), reply(3, &[0]), reply(4, &[0])]).await;
        assert_eq!(client.device_readstb().await.unwrap(), 0x50);
        client.device_clear().await.unwrap();
        client.device_lock().await.unwrap();

        let script = factory.script.lock().unwrap();
        let readstb = to_words(&script.writes[0]);
        assert_eq!(&readstb[6..7], &[13]);
        assert_eq!(&readstb[11..], &[7, 0, 8000, 8000]);
        assert_eq!(to_words(&script.writes[1])[6], 15);
        let lock = to_words(&script.writes[2]);
        assert_eq!(lock[6], 18);
        assert_eq!(&lock[11..], &[7, 0, 8000]);
    }

    #[tokio::test]
    async fn test_destroy_link_closes_stream() {
        let (mut client, factory, events) = linked(vec![reply(2, &[0])]).await;
        client.destroy_link().await.unwrap();

        assert!(!client.connection_ok());
        assert!(!client.can_write());
        assert_eq!(*events.lock().unwrap(), vec![(false, false)]);
        let call = to_words(&factory.script.lock().unwrap().writes[0]);
        assert_eq!(&call[6..], &[23, 0, 0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn test_reconnect_destroys_old_link_silently() {
        let (mut client, factory, events) =
            linked(vec![reply(2, &[0]), reply(3, &[0, 8, 0, 786])]).await;
        client.connect_to_device(Some(1024), false).await.unwrap();

        assert_eq!(client.link_id(), 8);
        assert_eq!(*events.lock().unwrap(), vec![(true, true)]);
        let script = factory.script.lock().unwrap();
        assert_eq!(to_words(&script.writes[0])[6], 23);
        assert_eq!(to_words(&script.writes[1])[6], 10);
    }

    #[tokio::test]
    async fn test_xid_mismatch_rejected() {
        let (mut client, _, _) = linked(vec![reply(9, &[0])]).await;
        assert!(matches!(
            client.device_trigger().await,
            Err(Sr86xError::Rpc(ReplyError::XidMismatch { expected: 2, got: 9 }))
        ));
    }

    #[tokio::test]
    async fn test_non_final_fragment_rejected() {
        let mut partial = reply(2, &[0]);
        partial[0] &= 0x7f;
        let (mut client, _, _) = linked(vec![partial]).await;
        assert!(matches!(
            client.device_remote().await,
            Err(Sr86xError::Rpc(ReplyError::NotFinalFragment(_)))
        ));
    }

    #[tokio::test]
    async fn test_non_final_fragment_drops_link_then_recovers() {
        let mut partial = reply(2, &[0]);
        partial[0] &= 0x7f;
        let (mut client, factory, events) =
            linked(vec![partial, reply(3, &[0, 8, 0, 786]), reply(4, &[0])]).await;

        assert!(matches!(
            client.device_remote().await,
            Err(Sr86xError::Rpc(ReplyError::NotFinalFragment(_)))
        ));
        assert!(!client.connection_ok());
        assert_eq!(client.link_id(), -1);
        assert_eq!(*events.lock().unwrap(), vec![(false, false)]);

        // leftover reply bytes must not be read as the next marker
        assert!(matches!(client.device_trigger().await, Err(Sr86xError::NoLink)));
        assert_eq!(factory.script.lock().unwrap().writes.len(), 1);

        client.connect_to_device(Some(1024), false).await.unwrap();
        assert_eq!(client.link_id(), 8);
        client.device_trigger().await.unwrap();
        assert!(client.connection_ok());
    }

    #[tokio::test]
    async fn test_oversize_reply_drops_link() {
        let mut huge = words(&[LAST_FRAGMENT | 4000, 2, 1, 0, 0, 0, 0, 0]);
        huge.resize(4004, 0);
        let (mut client, _, events) = linked(vec![huge]).await;

        assert!(matches!(
            client.device_clear().await,
            Err(Sr86xError::PayloadTooLarge { len: 4004, .. })
        ));
        assert!(!client.connection_ok());
        assert_eq!(*events.lock().unwrap(), vec![(false, false)]);
    }

    #[tokio::test]
    async fn test_stream_end_invalidates_link() {
        let (mut client, _, events) = linked(vec![]).await;
        let err = client.device_local().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!client.connection_ok());
        assert_eq!(*events.lock().unwrap(), vec![(false, false)]);
    }
}
