use hprof_core::error::{Error, FormatError};
use hprof_core::{IdSize, ObjectId};
use std::io::{self, Read};

const SKIP_CHUNK: usize = 8 * 1024;
const READ_CHUNK: usize = 64 * 1024;

/// Forward-only, position-tracked reader over a big-endian byte stream.
///
/// Reads never fail: once the stream runs dry the reader latches `eof` and
/// hands back zeros. Callers check [`ByteReader::is_eof`] after reading.
#[derive(Debug)]
pub struct ByteReader<R> {
    inner: R,
    position: u64,
    total: Option<u64>,
    eof: bool,
    io_error: Option<io::Error>,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            total: None,
            eof: false,
            io_error: None,
        }
    }

    /// Reader whose total length is known up front (enables progress reporting).
    pub fn with_total(inner: R, total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::new(inner)
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The underlying I/O error that ended the stream, if it was not a clean EOF.
    pub fn take_io_error(&mut self) -> Option<io::Error> {
        self.io_error.take()
    }

    /// Fills `buf` completely or latches end-of-stream. Returns the bytes actually read.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        if self.eof {
            buf.fill(0);
            return 0;
        }
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.eof = true;
                    self.io_error = Some(e);
                    break;
                }
            }
        }
        self.position += filled as u64;
        buf[filled..].fill(0);
        filled
    }

    fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        self.read_into(&mut buf);
        buf
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_array::<1>()[0]
    }

    pub fn read_u16(&mut self) -> u16 {
        u16::from_be_bytes(self.read_array::<2>())
    }

    pub fn read_u32(&mut self) -> u32 {
        u32::from_be_bytes(self.read_array::<4>())
    }

    pub fn read_u64(&mut self) -> u64 {
        u64::from_be_bytes(self.read_array::<8>())
    }

    /// Reads exactly `n` bytes into a freshly allocated buffer.
    ///
    /// When the total length is unknown the buffer grows one chunk at a time,
    /// so memory tracks the bytes actually present rather than `n`.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ReadShortfall> {
        let mut out = Vec::new();
        if let Some(total) = self.total {
            if self.position.saturating_add(n as u64) > total {
                self.eof = true;
                return Err(ReadShortfall::Eof);
            }
            out.try_reserve_exact(n)
                .map_err(|_| ReadShortfall::Alloc)?;
        }
        while out.len() < n {
            let start = out.len();
            let step = (n - start).min(READ_CHUNK);
            out.try_reserve(step)
                .map_err(|_| ReadShortfall::Alloc)?;
            out.resize(start + step, 0);
            if self.read_into(&mut out[start..]) < step {
                return Err(ReadShortfall::Eof);
            }
        }
        Ok(out)
    }

    /// Discards `n` bytes. Returns false if the stream ended first.
    pub fn skip(&mut self, n: u64) -> bool {
        let mut scratch = [0u8; SKIP_CHUNK];
        let mut left = n;
        while left > 0 {
            let step = usize::try_from(left).map_or(SKIP_CHUNK, |l| l.min(SKIP_CHUNK));
            let got = self.read_into(&mut scratch[..step]);
            left -= got as u64;
            if got < step {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadShortfall {
    Eof,
    Alloc,
}

/// Why a section stopped producing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionFault {
    /// A read asked for more than the declared section length.
    Overrun { at: u64, needed: u64, remaining: u64 },
    /// The stream ended inside the section.
    Eof { at: u64 },
    /// A blob of the declared size could not be allocated.
    Alloc { at: u64, bytes: u64 },
}

impl SectionFault {
    pub fn into_format_error(self, record: &'static str) -> FormatError {
        match self {
            Self::Overrun {
                at,
                needed,
                remaining,
            } => FormatError::SectionOverrun {
                record,
                at,
                needed,
                remaining,
            },
            Self::Eof { at } => FormatError::UnexpectedEof { record, at },
            Self::Alloc { at, bytes } => FormatError::Allocation { record, at, bytes },
        }
    }
}

/// A length-bounded view over a [`ByteReader`] covering one record payload.
///
/// Every read is charged against `remaining`. The first read that would run
/// past the budget, or past the end of the stream, latches a fault; from then
/// on every read is a no-op that returns zero. Check [`SectionReader::fault`]
/// once the section has been consumed.
#[derive(Debug)]
pub struct SectionReader<'r, R> {
    reader: &'r mut ByteReader<R>,
    remaining: u64,
    id_size: IdSize,
    fault: Option<SectionFault>,
}

impl<'r, R: Read> SectionReader<'r, R> {
    pub fn new(reader: &'r mut ByteReader<R>, length: u64, id_size: IdSize) -> Self {
        Self {
            reader,
            remaining: length,
            id_size,
            fault: None,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn total(&self) -> Option<u64> {
        self.reader.total()
    }

    pub fn is_error_occurred(&self) -> bool {
        self.fault.is_some()
    }

    pub fn fault(&self) -> Option<SectionFault> {
        self.fault
    }

    /// True once the whole budget has been consumed without a fault.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0 && self.fault.is_none()
    }

    fn charge(&mut self, n: u64) -> bool {
        if self.fault.is_some() {
            return false;
        }
        if n > self.remaining {
            self.fault = Some(SectionFault::Overrun {
                at: self.reader.position(),
                needed: n,
                remaining: self.remaining,
            });
            return false;
        }
        self.remaining -= n;
        true
    }

    fn check_eof(&mut self, at: u64) {
        if self.reader.is_eof() && self.fault.is_none() {
            self.fault = Some(SectionFault::Eof { at });
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        if !self.charge(1) {
            return 0;
        }
        let at = self.reader.position();
        let v = self.reader.read_u8();
        self.check_eof(at);
        v
    }

    pub fn read_u16(&mut self) -> u16 {
        if !self.charge(2) {
            return 0;
        }
        let at = self.reader.position();
        let v = self.reader.read_u16();
        self.check_eof(at);
        v
    }

    pub fn read_u32(&mut self) -> u32 {
        if !self.charge(4) {
            return 0;
        }
        let at = self.reader.position();
        let v = self.reader.read_u32();
        self.check_eof(at);
        v
    }

    pub fn read_u64(&mut self) -> u64 {
        if !self.charge(8) {
            return 0;
        }
        let at = self.reader.position();
        let v = self.reader.read_u64();
        self.check_eof(at);
        v
    }

    /// Reads one object id of the dump-wide width.
    pub fn read_id(&mut self) -> ObjectId {
        match self.id_size {
            IdSize::Four => ObjectId(u64::from(self.read_u32())),
            IdSize::Eight => ObjectId(self.read_u64()),
        }
    }

    /// Reads `n` raw bytes. Returns an empty buffer once faulted.
    pub fn read_bytes(&mut self, n: u64) -> Vec<u8> {
        if !self.charge(n) {
            return Vec::new();
        }
        let at = self.reader.position();
        let Ok(len) = usize::try_from(n) else {
            self.fault = Some(SectionFault::Alloc { at, bytes: n });
            return Vec::new();
        };
        match self.reader.read_bytes(len) {
            Ok(bytes) => bytes,
            Err(ReadShortfall::Eof) => {
                self.fault = Some(SectionFault::Eof { at });
                Vec::new()
            }
            Err(ReadShortfall::Alloc) => {
                self.fault = Some(SectionFault::Alloc { at, bytes: n });
                Vec::new()
            }
        }
    }

    pub fn skip(&mut self, n: u64) {
        if !self.charge(n) {
            return;
        }
        let at = self.reader.position();
        if !self.reader.skip(n) {
            self.fault = Some(SectionFault::Eof { at });
        }
    }

    /// Discards whatever is left of the section.
    pub fn skip_all(&mut self) {
        let n = self.remaining;
        self.skip(n);
    }

    /// Converts a latched fault into the decode error for `record`, surfacing
    /// the underlying I/O error when the stream broke rather than ended.
    pub fn finish(&mut self, record: &'static str) -> Result<(), Error> {
        match self.fault {
            None => Ok(()),
            Some(fault) => {
                if let Some(io) = self.reader.take_io_error() {
                    return Err(Error::Io(io));
                }
                Err(fault.into_format_error(record).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reads_big_endian_integers() {
        let data = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f,
        ];
        let mut r = ByteReader::new(&data[..]);
        assert_eq!(r.read_u8(), 0x01);
        assert_eq!(r.read_u16(), 0x0203);
        assert_eq!(r.read_u32(), 0x0405_0607);
        assert_eq!(r.read_u64(), 0x0809_0a0b_0c0d_0e0f);
        assert_eq!(r.position(), 15);
        assert!(!r.is_eof());
        assert_eq!(r.read_u8(), 0);
        assert!(r.is_eof());
    }

    #[test]
    fn short_read_latches_eof_and_zero_fills() {
        let data = [0xaa, 0xbb];
        let mut r = ByteReader::new(&data[..]);
        assert_eq!(r.read_u32(), 0);
        assert!(r.is_eof());
        assert_eq!(r.position(), 2);
        assert_eq!(r.read_bytes(1), Err(ReadShortfall::Eof));
    }

    #[test]
    fn oversized_blob_on_short_stream_is_eof() {
        let data = vec![0x5a; 100_000];
        let mut r = ByteReader::new(&data[..]);
        assert_eq!(r.read_bytes(usize::MAX), Err(ReadShortfall::Eof));
        assert_eq!(r.position(), 100_000);
        assert!(r.is_eof());

        let mut r = ByteReader::new(&data[..]);
        let blob = r.read_bytes(70_000).unwrap();
        assert_eq!(blob.len(), 70_000);
        assert!(blob.iter().all(|&b| b == 0x5a));
        assert!(!r.is_eof());
    }

    #[test]
    fn skip_reports_end_of_stream() {
        let data = vec![0u8; 20_000];
        let mut r = ByteReader::new(&data[..]);
        assert!(r.skip(19_999));
        assert!(!r.skip(2));
        assert!(r.is_eof());
    }

    #[test]
    fn section_overrun_latches_fault() {
        let data = [0u8; 16];
        let mut r = ByteReader::new(&data[..]);
        let mut s = SectionReader::new(&mut r, 6, IdSize::Four);
        assert_eq!(s.read_u32(), 0);
        assert!(!s.is_error_occurred());
        assert_eq!(s.read_u32(), 0);
        assert!(s.is_error_occurred());
        assert_eq!(
            s.fault(),
            Some(SectionFault::Overrun {
                at: 4,
                needed: 4,
                remaining: 2
            })
        );
        // No-ops after the fault; the budget is left untouched.
        assert_eq!(s.read_u8(), 0);
        assert_eq!(s.remaining(), 2);
        let err = s.finish("TEST").unwrap_err().to_string();
        assert!(err.contains("overruns its section"), "{err}");
    }

    #[test]
    fn section_eof_inside_budget() {
        let data = [0u8; 3];
        let mut r = ByteReader::new(&data[..]);
        let mut s = SectionReader::new(&mut r, 100, IdSize::Four);
        s.read_id();
        assert_eq!(s.fault(), Some(SectionFault::Eof { at: 0 }));
        let err = s.finish("LOAD CLASS").unwrap_err().to_string();
        assert!(err.contains("unexpected end of stream in LOAD CLASS"), "{err}");
    }

    #[test]
    fn skip_all_consumes_remaining_budget() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut r = ByteReader::new(&data[..]);
        {
            let mut s = SectionReader::new(&mut r, 4, IdSize::Four);
            s.read_u8();
            s.skip_all();
            assert!(s.is_exhausted());
        }
        assert_eq!(r.read_u8(), 5);
    }

    #[test]
    fn read_bytes_is_bounded_by_budget() {
        let data = [9u8; 8];
        let mut r = ByteReader::new(&data[..]);
        let mut s = SectionReader::new(&mut r, 4, IdSize::Eight);
        assert!(s.read_bytes(u64::MAX).is_empty());
        assert!(matches!(s.fault(), Some(SectionFault::Overrun { .. })));
    }

    proptest! {
        #[test]
        fn read_id_matches_manual_decode(bytes in proptest::collection::vec(any::<u8>(), 8)) {
            for id_size in [IdSize::Four, IdSize::Eight] {
                let mut r = ByteReader::new(&bytes[..]);
                let mut s = SectionReader::new(&mut r, 8, id_size);
                let id = s.read_id();
                prop_assert!(!s.is_error_occurred());

                let mut r2 = ByteReader::new(&bytes[..]);
                let raw = r2.read_bytes(id_size.bytes()).unwrap();
                let manual = raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
                prop_assert_eq!(id, ObjectId(manual));
                prop_assert_eq!(Some(id), id_size.decode(&raw));
            }
        }
    }
}
