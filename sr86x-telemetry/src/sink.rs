//! Capture file sinks
//!
//! Binary sinks store each packet exactly as converted to host byte order,
//! header included. CSV sinks start with a local timestamp line, describe the
//! columns whenever content type or rate changes and write one line per
//! sample tuple.

use crate::header::PacketHeader;
use crate::packet::{HEADER_SIZE, float_at, int_pair_at};
use sr86x_core::{Sr86xError, Sr86xResult};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// Raw host-order packets (`.dat`)
    Binary,
    /// Comma separated text (`.csv`)
    Csv,
}

impl SinkFormat {
    /// Choose the format from a file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Sr86xResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("dat") => Ok(SinkFormat::Binary),
            Some("csv") => Ok(SinkFormat::Csv),
            _ => Err(Sr86xError::InvalidData(format!(
                "unsupported capture file type: {}",
                path.display()
            ))),
        }
    }
}

/// Destination for decoded packets
pub struct CaptureSink {
    format: SinkFormat,
    writer: Box<dyn Write + Send>,
    last_header: Option<u32>,
}

impl std::fmt::Debug for CaptureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSink")
            .field("format", &self.format)
            .field("last_header", &self.last_header)
            .finish()
    }
}

impl CaptureSink {
    /// Wrap a writer; CSV sinks write their timestamp line immediately
    pub fn new<W: Write + Send + 'static>(format: SinkFormat, writer: W) -> io::Result<Self> {
        let mut sink = Self {
            format,
            writer: Box::new(writer),
            last_header: None,
        };
        if format == SinkFormat::Csv {
            let now = chrono::Local::now();
            writeln!(sink.writer, "{}", now.format("%Y-%m-%d %H:%M"))?;
        }
        Ok(sink)
    }

    /// Open a capture file, truncating or appending
    pub fn create<P: AsRef<Path>>(path: P, format: SinkFormat, truncate: bool) -> Sr86xResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(truncate)
            .append(!truncate)
            .open(path)?;
        log::info!("Capture file {} opened ({:?})", path.display(), format);
        Ok(Self::new(format, BufWriter::new(file))?)
    }

    pub fn format(&self) -> SinkFormat {
        self.format
    }

    /// Record a counter gap; only CSV sinks keep a note of it
    pub fn write_drop(&mut self, dropped: u8) -> io::Result<()> {
        if self.format == SinkFormat::Csv {
            writeln!(self.writer, "Dropped {} packets!", dropped)?;
        }
        Ok(())
    }

    /// Persist one host-order packet
    pub fn write_packet(&mut self, header: &PacketHeader, packet: &[u8]) -> io::Result<()> {
        // whole words only
        let packet = &packet[..packet.len() & !3];
        match self.format {
            SinkFormat::Binary => self.writer.write_all(packet),
            SinkFormat::Csv => {
                let payload = packet.get(HEADER_SIZE..).unwrap_or(&[]);
                self.write_csv(header, payload)
            }
        }
    }

    fn write_csv(&mut self, header: &PacketHeader, payload: &[u8]) -> io::Result<()> {
        if self.last_header.is_none_or(|last| header.label_changed(last)) {
            self.last_header = Some(header.raw());
            writeln!(self.writer, "{}", header)?;
        }

        let words = payload.len() / 4;
        let w = &mut self.writer;
        match header.what {
            1 | 2 => {
                for i in (0..words.saturating_sub(1)).step_by(2) {
                    writeln!(w, "{},{}", sci(float_at(payload, i)), sci(float_at(payload, i + 1)))?;
                }
            }
            3 => {
                for i in (0..words.saturating_sub(3)).step_by(4) {
                    writeln!(
                        w,
                        "{},{},{},{}",
                        sci(float_at(payload, i)),
                        sci(float_at(payload, i + 1)),
                        sci(float_at(payload, i + 2)),
                        sci(float_at(payload, i + 3))
                    )?;
                }
            }
            4 => {
                for i in 0..words {
                    let (a, b) = int_pair_at(payload, i);
                    writeln!(w, "{}\n{}", a, b)?;
                }
            }
            5 | 6 => {
                for i in 0..words {
                    let (a, b) = int_pair_at(payload, i);
                    writeln!(w, "{},{}", a, b)?;
                }
            }
            7 => {
                for i in (0..words.saturating_sub(1)).step_by(2) {
                    let (x, y) = int_pair_at(payload, i);
                    let (r, theta) = int_pair_at(payload, i + 1);
                    writeln!(w, "{},{},{},{}", x, y, r, theta)?;
                }
            }
            _ => {
                for i in 0..words {
                    writeln!(w, "{}", sci(float_at(payload, i)))?;
                }
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Scientific notation with five fractional digits and a signed two-digit exponent
fn sci(value: f32) -> String {
    let s = format!("{:.5e}", value);
    match s.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn host_packet(header: u32, words: &[[u8; 4]]) -> Vec<u8> {
        let mut p = header.to_ne_bytes().to_vec();
        for w in words {
            p.extend_from_slice(w);
        }
        p
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SinkFormat::from_path("run.dat").unwrap(), SinkFormat::Binary);
        assert_eq!(SinkFormat::from_path("/tmp/Run.CSV").unwrap(), SinkFormat::Csv);
        assert!(SinkFormat::from_path("run.txt").is_err());
        assert!(SinkFormat::from_path("run").is_err());
    }

    #[test]
    fn test_sci_format() {
        assert_eq!(sci(1.5), "1.50000e+00");
        assert_eq!(sci(-0.000123), "-1.23000e-04");
        assert_eq!(sci(78125.0), "7.81250e+04");
        assert_eq!(sci(0.0), "0.00000e+00");
    }

    #[test]
    fn test_binary_writes_packet_verbatim() {
        let buf = SharedBuf::default();
        let mut sink = CaptureSink::new(SinkFormat::Binary, buf.clone()).unwrap();
        let header = PacketHeader::from_raw(0x0000_3001);
        let packet = host_packet(header.raw(), &[1.0f32.to_ne_bytes()]);

        sink.write_drop(3).unwrap();
        sink.write_packet(&header, &packet).unwrap();
        assert_eq!(*buf.0.lock().unwrap(), packet);
    }

    #[test]
    fn test_csv_label_only_on_change() {
        let buf = SharedBuf::default();
        let mut sink = CaptureSink::new(SinkFormat::Csv, buf.clone()).unwrap();

        let xy = PacketHeader::from_raw(0x0004_3101);
        let words = [1.5f32.to_ne_bytes(), (-2.0f32).to_ne_bytes()];
        sink.write_packet(&xy, &host_packet(xy.raw(), &words)).unwrap();
        let next = PacketHeader::from_raw(0x0004_3102);
        sink.write_packet(&next, &host_packet(next.raw(), &words)).unwrap();
        let faster = PacketHeader::from_raw(0x0003_3103);
        sink.write_packet(&faster, &host_packet(faster.raw(), &words)).unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0].len(), "2026-01-01 00:00".len());
        assert_eq!(lines[1], "X,Y (float) @ 78125 Hz");
        assert_eq!(lines[2], "1.50000e+00,-2.00000e+00");
        assert_eq!(lines[3], "1.50000e+00,-2.00000e+00");
        assert_eq!(lines[4], "X,Y (float) @ 156250 Hz");
    }

    #[test]
    fn test_csv_first_packet_always_labeled() {
        let buf = SharedBuf::default();
        let mut sink = CaptureSink::new(SinkFormat::Csv, buf.clone()).unwrap();
        let header = PacketHeader::from_raw(0);
        sink.write_packet(&header, &host_packet(0, &[2.0f32.to_ne_bytes()])).unwrap();
        assert_eq!(buf.lines()[1..], ["X (float) @ 1250000 Hz", "2.00000e+00"]);
    }

    #[test]
    fn test_csv_int_layouts() {
        let pair = |a: i16, b: i16| {
            let mut w = [0u8; 4];
            w[..2].copy_from_slice(&a.to_ne_bytes());
            w[2..].copy_from_slice(&b.to_ne_bytes());
            w
        };

        let buf = SharedBuf::default();
        let mut sink = CaptureSink::new(SinkFormat::Csv, buf.clone()).unwrap();
        let x_only = PacketHeader::from_raw(0x0000_3400);
        sink.write_packet(&x_only, &host_packet(x_only.raw(), &[pair(1, -1)])).unwrap();
        let xyrt = PacketHeader::from_raw(0x0000_3700);
        sink.write_packet(&xyrt, &host_packet(xyrt.raw(), &[pair(1, 2), pair(3, 4), pair(5, 6)]))
            .unwrap();

        assert_eq!(
            buf.lines()[1..],
            [
                "X (int) @ 1250000 Hz",
                "1",
                "-1",
                "X,Y,R,theta (int) @ 1250000 Hz",
                "1,2,3,4"
            ]
        );
    }

    #[test]
    fn test_csv_drop_line() {
        let buf = SharedBuf::default();
        let mut sink = CaptureSink::new(SinkFormat::Csv, buf.clone()).unwrap();
        sink.write_drop(1).unwrap();
        assert_eq!(buf.lines()[1], "Dropped 1 packets!");
    }
}
