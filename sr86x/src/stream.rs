//! Instrument streaming control
//!
//! Drives the SR86x `STREAM*` command set over a VXI-11 link and keeps a
//! local copy of the instrument's stream settings.

use sr86x_core::{Sr86xError, Sr86xResult};
use sr86x_transport::TransportFactory;
use sr86x_vxi11::Vxi11Client;
use std::str::FromStr;

/// Packets per second below which small packets are selected
const MIN_PACKET_RATE: f64 = 1.0;
/// Packets per second above which large packets are selected
const MAX_PACKET_RATE: f64 = 20_000.0;

/// Packet size selector for 128-byte payloads
pub const SMALLEST_PACKET: u8 = 3;

/// Stream settings as last read from or written to the instrument
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamSettings {
    pub streaming: bool,
    /// Content type, 0-3 float and 4-7 integer
    pub what: u8,
    /// Native sample rate of the instrument in Hz
    pub max_rate_hz: f64,
    /// Rate divider exponent; streamed rate is max_rate_hz / 2^rate
    pub rate: u8,
    /// Packet size selector; payload = 1024 >> packet_size bytes
    pub packet_size: u8,
    pub port: u16,
    pub little_endian: bool,
    pub checksum: bool,
}

impl StreamSettings {
    /// Streamed sample rate in Hz
    pub fn stream_rate_hz(&self) -> f64 {
        self.max_rate_hz / 2f64.powi(i32::from(self.rate))
    }
}

/// Pick a packet size for the planned stream
///
/// Returns the new size selector when the current one should change:
/// 128-byte packets when fewer than one packet per second would be sent,
/// 1024-byte packets above 20 000 packets per second.
pub fn choose_packet_size(max_rate_hz: f64, rate: u8, what: u8, current: u8) -> Option<u8> {
    let mut byte_rate = 4.0 * max_rate_hz * 0.5f64.powi(i32::from(rate));
    byte_rate *= match what {
        1 | 2 | 7 => 2.0,
        3 => 4.0,
        4 => 0.5,
        _ => 1.0,
    };

    let packet_rate = byte_rate / f64::from(1024u32 >> current.min(SMALLEST_PACKET));
    if packet_rate < MIN_PACKET_RATE && current < SMALLEST_PACKET {
        Some(SMALLEST_PACKET)
    } else if packet_rate > MAX_PACKET_RATE && current > 0 {
        Some(0)
    } else {
        None
    }
}

/// Render a rate as `"78.1 kHz"`, three significant digits
pub fn format_rate(hz: f64) -> String {
    let (scaled, unit) = if hz >= 1.0e6 {
        (hz / 1.0e6, "MHz")
    } else if hz > 1.0e3 {
        (hz / 1.0e3, "kHz")
    } else {
        (hz, "Hz")
    };
    let decimals = if scaled > 99.95 {
        0
    } else if scaled > 9.995 {
        1
    } else {
        2
    };
    format!("{:.*} {}", decimals, scaled, unit)
}

/// Streaming control session with one instrument
pub struct InstrumentStream<F: TransportFactory> {
    client: Vxi11Client<F>,
    settings: StreamSettings,
}

impl<F: TransportFactory> InstrumentStream<F> {
    pub fn new(client: Vxi11Client<F>) -> Self {
        Self {
            client,
            settings: StreamSettings::default(),
        }
    }

    pub fn client(&self) -> &Vxi11Client<F> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Vxi11Client<F> {
        &mut self.client
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.client.connection_ok()
    }

    /// Connect, identify and read the stream settings
    ///
    /// A previous session is stopped and its link destroyed first. Returns
    /// the identification string.
    pub async fn connect(&mut self, port: Option<u16>) -> Sr86xResult<String> {
        if self.client.connection_ok() {
            if self.settings.streaming {
                let _ = self.client.device_write("STREAM 0").await;
            }
            let _ = self.client.destroy_link().await;
        }
        self.settings.streaming = false;

        let lock = self.client.config().lock_device;
        self.client.connect_to_device(port, lock).await?;
        let id = self.identify().await?;
        self.sync().await?;
        Ok(id)
    }

    /// Clear the device and read its identification string
    pub async fn identify(&mut self) -> Sr86xResult<String> {
        self.client.device_clear().await?;
        let id = self.client.query("*IDN?").await?;
        Ok(id.trim().to_string())
    }

    /// Read every stream setting from the instrument
    pub async fn sync(&mut self) -> Sr86xResult<&StreamSettings> {
        self.settings.streaming = self.query_value::<i32>("STREAM?").await? != 0;
        self.settings.what = self.query_channels().await?;
        self.sync_max_rate().await?;
        self.settings.rate = self.query_value("STREAMRATE?").await?;
        self.settings.packet_size = self.query_value("STREAMPCKT?").await?;
        self.settings.port = self.query_value("STREAMPORT?").await?;
        let options: u8 = self.query_value("STREAMOPTION?").await?;
        self.settings.little_endian = options & 0x01 != 0;
        self.settings.checksum = options & 0x02 != 0;
        log::debug!("Stream settings {:?}", self.settings);
        Ok(&self.settings)
    }

    /// Read only the native sample rate, which follows the reference frequency
    pub async fn sync_max_rate(&mut self) -> Sr86xResult<f64> {
        self.settings.max_rate_hz = self.query_value("STREAMRATEMAX?").await?;
        Ok(self.settings.max_rate_hz)
    }

    /// Start or stop streaming
    ///
    /// Before starting, the packet size is adapted to the data rate and the
    /// instrument is asked to send in host byte order.
    pub async fn set_streaming(&mut self, on: bool) -> Sr86xResult<()> {
        if on {
            let s = &self.settings;
            if let Some(size) = choose_packet_size(s.max_rate_hz, s.rate, s.what, s.packet_size) {
                log::info!("Switching to {}-byte packets", 1024u32 >> size);
                self.set_packet_size(size).await?;
            }
            if cfg!(target_endian = "little") && !self.settings.little_endian {
                let checksum = self.settings.checksum;
                self.set_options(true, checksum).await?;
            }
        }

        self.client
            .device_write(&format!("STREAM {}", u8::from(on)))
            .await?;
        self.settings.streaming = on;
        Ok(())
    }

    /// Select the streamed channels; returns what the instrument accepted
    pub async fn set_channels(&mut self, what: u8) -> Sr86xResult<u8> {
        self.client
            .device_write(&format!("STREAMCH {}", what % 4))
            .await?;
        self.client
            .device_write(&format!("STREAMFMT {}", u8::from(what >= 4)))
            .await?;

        let actual = self.query_channels().await?;
        if actual != what {
            log::warn!("Instrument kept channel selection {} instead of {}", actual, what);
        }
        self.settings.what = actual;
        Ok(actual)
    }

    /// Set the rate divider; returns what the instrument accepted
    pub async fn set_rate(&mut self, rate: u8) -> Sr86xResult<u8> {
        self.client
            .device_write(&format!("STREAMRATE {}", rate))
            .await?;
        let actual: u8 = self.query_value("STREAMRATE?").await?;
        if actual != rate {
            log::warn!("Instrument kept rate divider {} instead of {}", actual, rate);
        }
        self.settings.rate = actual;
        Ok(actual)
    }

    pub async fn set_packet_size(&mut self, size: u8) -> Sr86xResult<()> {
        self.client
            .device_write(&format!("STREAMPCKT {}", size))
            .await?;
        self.settings.packet_size = size;
        Ok(())
    }

    /// Tell the instrument which UDP port to stream to
    pub async fn set_port(&mut self, port: u16) -> Sr86xResult<()> {
        self.client
            .device_write(&format!("STREAMPORT {}", port))
            .await?;
        self.settings.port = port;
        Ok(())
    }

    pub async fn set_options(&mut self, little_endian: bool, checksum: bool) -> Sr86xResult<()> {
        let value = u8::from(little_endian) | (u8::from(checksum) << 1);
        self.client
            .device_write(&format!("STREAMOPTION {}", value))
            .await?;
        self.settings.little_endian = little_endian;
        self.settings.checksum = checksum;
        Ok(())
    }

    /// Stop streaming and release the link
    pub async fn shutdown(&mut self) -> Sr86xResult<()> {
        if !self.client.connection_ok() {
            return Ok(());
        }
        if self.settings.streaming {
            self.set_streaming(false).await?;
        }
        self.client.destroy_link().await
    }

    async fn query_channels(&mut self) -> Sr86xResult<u8> {
        let channels: u8 = self.query_value("STREAMCH?").await?;
        let format: u8 = self.query_value("STREAMFMT?").await?;
        Ok(channels.saturating_add(format.saturating_mul(4)))
    }

    async fn query_value<T: FromStr>(&mut self, command: &str) -> Sr86xResult<T> {
        let reply = self.client.query(command).await?;
        parse_reply(command, &reply)
    }
}

fn parse_reply<T: FromStr>(command: &str, reply: &str) -> Sr86xResult<T> {
    reply.trim().parse().map_err(|_| {
        Sr86xError::InvalidData(format!("unexpected reply to {}: {:?}", command, reply.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(78_125.0), "78.1 kHz");
        assert_eq!(format_rate(1.25e6), "1.25 MHz");
        assert_eq!(format_rate(625_000.0), "625 kHz");
        assert_eq!(format_rate(9_765.625), "9.77 kHz");
        assert_eq!(format_rate(1_000.0), "1000 Hz");
        assert_eq!(format_rate(500.0), "500 Hz");
        assert_eq!(format_rate(2.384), "2.38 Hz");
    }

    #[test]
    fn test_packet_size_kept_in_band() {
        // 1.25 MHz X float on 512-byte packets: ~9766 packets/s
        assert_eq!(choose_packet_size(1.25e6, 0, 0, 1), None);
    }

    #[test]
    fn test_packet_size_grows_at_high_rate() {
        // XYRΘ float: ~39 000 packets/s on 512-byte packets
        assert_eq!(choose_packet_size(1.25e6, 0, 3, 1), Some(0));
        assert_eq!(choose_packet_size(1.25e6, 0, 3, 0), None);
    }

    #[test]
    fn test_packet_size_shrinks_at_low_rate() {
        assert_eq!(choose_packet_size(1.25e6, 20, 0, 0), Some(3));
        assert_eq!(choose_packet_size(1.25e6, 20, 0, 3), None);
    }

    #[test]
    fn test_stream_rate() {
        let settings = StreamSettings {
            max_rate_hz: 1.25e6,
            rate: 4,
            ..Default::default()
        };
        assert_eq!(settings.stream_rate_hz(), 78_125.0);
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply::<u16>("STREAMPORT?", "1865\n").unwrap(), 1865);
        assert_eq!(parse_reply::<f64>("STREAMRATEMAX?", " 1.25E+6\n").unwrap(), 1.25e6);
        assert!(matches!(
            parse_reply::<u8>("STREAMCH?", "X\n"),
            Err(Sr86xError::InvalidData(_))
        ));
    }
}
