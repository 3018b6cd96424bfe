//! The streaming envelope: authenticated encryption over byte streams of
//! unknown length, in fixed-size packages.
//!
//! Wire format:
//! ```text
//! stream  := header || package*
//! header  := version(1) = 0x20 || cipher(1) = 0x00
//! package := plain_len(4, LE) || final(1) || nonce(12) || ciphertext || tag(16)
//! ```
//! Each package seals up to 64 KiB of plaintext with AES-256-GCM under a
//! fresh random nonce. The package sequence number (8 bytes, BE) and the
//! final flag are bound as associated data, so reordering, replaying or
//! truncating packages fails authentication rather than silently producing
//! shuffled plaintext. Every stream ends with a final-flagged package; for
//! inputs that are an exact multiple of the package size that last package
//! is empty.

use std::io::{self, Read, Write};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use frostbox_core::{FbError, FbResult, RangeSink};
use frostbox_secure::SecureBytes;

use crate::{AEAD_NONCE_SIZE, TAG_SIZE};

/// Envelope format version byte.
pub const ENVELOPE_VERSION: u8 = 0x20;
/// Cipher suite byte: AES-256-GCM is the only defined suite.
pub const CIPHER_AES256_GCM: u8 = 0x00;
/// The two-byte stream header.
pub const ENVELOPE_HEADER: [u8; 2] = [ENVELOPE_VERSION, CIPHER_AES256_GCM];

/// Maximum plaintext bytes per package.
pub const PACKAGE_SIZE: usize = 64 * 1024;
/// Per-package framing cost: length, final flag, nonce, tag.
pub const PACKAGE_OVERHEAD: usize = 4 + 1 + AEAD_NONCE_SIZE + TAG_SIZE;

/// Exact encrypted size for `plain_len` plaintext bytes.
///
/// Lets callers report transfer totals without streaming twice.
pub fn encrypted_len(plain_len: u64) -> u64 {
    let packages = plain_len / PACKAGE_SIZE as u64 + 1;
    ENVELOPE_HEADER.len() as u64 + plain_len + packages * PACKAGE_OVERHEAD as u64
}

/// Where a consumer is within the envelope framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    /// The two header bytes have not been fully seen yet.
    AwaitingHeader,
    /// Header accepted; package data flows.
    Streaming,
}

fn stream_cipher(key: &SecureBytes) -> FbResult<Aes256Gcm> {
    let view = key.expose()?;
    Aes256Gcm::new_from_slice(&view)
        .map_err(|_| FbError::Format("content key must be 32 bytes".into()))
}

fn package_aad(seq: u64, is_final: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = is_final as u8;
    aad
}

// ── encryption ─────────────────────────────────────────────────────────────

/// Wraps a plaintext [`Read`] and yields the encrypted envelope.
///
/// Pull-based so it plugs straight into upload code that consumes a reader;
/// plaintext never exists in full in memory, only one package at a time.
pub struct EncryptingReader<R> {
    inner: R,
    cipher: Aes256Gcm,
    seq: u64,
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> EncryptingReader<R> {
    pub fn new(content_key: &SecureBytes, inner: R) -> FbResult<Self> {
        Ok(Self {
            inner,
            cipher: stream_cipher(content_key)?,
            seq: 0,
            buf: ENVELOPE_HEADER.to_vec(),
            pos: 0,
            done: false,
        })
    }

    /// Seal the next package into `self.buf`.
    fn next_package(&mut self) -> io::Result<()> {
        let mut chunk = vec![0u8; PACKAGE_SIZE];
        let mut filled = 0;
        let mut eof = false;
        while filled < PACKAGE_SIZE {
            match self.inner.read(&mut chunk[filled..]) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let is_final = eof;
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let aad = package_aad(self.seq, is_final);
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload { msg: &chunk[..filled], aad: &aad },
            )
            .map_err(|_| FbError::Integrity("package seal failed".into()).into_io())?;
        chunk.zeroize();

        self.buf.clear();
        self.pos = 0;
        self.buf.extend_from_slice(&(filled as u32).to_le_bytes());
        self.buf.push(is_final as u8);
        self.buf.extend_from_slice(&nonce);
        self.buf.extend_from_slice(&sealed);
        self.seq += 1;
        if is_final {
            self.done = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.buf.len() {
                let n = (self.buf.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            self.next_package()?;
        }
    }
}

// ── decryption ─────────────────────────────────────────────────────────────

/// Consumes the encrypted envelope and writes plaintext into `inner`.
///
/// Arbitrary input chunking is fine; partial packages are buffered until
/// complete. Call [`finish`](Self::finish) after the last bytes — a stream
/// that never produced its final-flagged package was truncated, and only
/// `finish` can tell.
pub struct DecryptingWriter<W> {
    inner: W,
    cipher: Aes256Gcm,
    seq: u64,
    state: EnvelopeState,
    finished: bool,
    buf: Vec<u8>,
}

impl<W: Write> DecryptingWriter<W> {
    pub fn new(content_key: &SecureBytes, inner: W) -> FbResult<Self> {
        Ok(Self {
            inner,
            cipher: stream_cipher(content_key)?,
            seq: 0,
            state: EnvelopeState::AwaitingHeader,
            finished: false,
            buf: Vec::new(),
        })
    }

    /// Feed encrypted bytes. Decrypted plaintext is written through as soon
    /// as complete packages are available.
    pub fn push(&mut self, data: &[u8]) -> FbResult<()> {
        self.buf.extend_from_slice(data);
        self.drain_packages()
    }

    /// Declare end of stream, verify completeness and return the inner
    /// writer. Fails with `Integrity` if the final package never arrived or
    /// bytes trail it.
    pub fn finish(self) -> FbResult<W> {
        if !self.finished {
            return Err(FbError::Integrity(
                "stream ended before its final package".into(),
            ));
        }
        if !self.buf.is_empty() {
            return Err(FbError::Integrity(
                "trailing bytes after the final package".into(),
            ));
        }
        Ok(self.inner)
    }

    fn drain_packages(&mut self) -> FbResult<()> {
        if self.state == EnvelopeState::AwaitingHeader {
            if self.buf.len() < ENVELOPE_HEADER.len() {
                return Ok(());
            }
            if self.buf[0] != ENVELOPE_VERSION {
                return Err(FbError::Format(format!(
                    "unsupported envelope version 0x{:02x}",
                    self.buf[0]
                )));
            }
            if self.buf[1] != CIPHER_AES256_GCM {
                return Err(FbError::Format(format!(
                    "unsupported envelope cipher 0x{:02x}",
                    self.buf[1]
                )));
            }
            self.buf.drain(..ENVELOPE_HEADER.len());
            self.state = EnvelopeState::Streaming;
        }

        loop {
            if self.finished {
                if !self.buf.is_empty() {
                    return Err(FbError::Integrity(
                        "data after the final package".into(),
                    ));
                }
                return Ok(());
            }
            if self.buf.len() < 5 {
                return Ok(());
            }
            let plain_len =
                u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if plain_len > PACKAGE_SIZE {
                return Err(FbError::Format(format!(
                    "package claims {plain_len} plaintext bytes, limit is {PACKAGE_SIZE}"
                )));
            }
            let final_flag = self.buf[4];
            if final_flag > 1 {
                return Err(FbError::Format(format!(
                    "invalid final flag 0x{final_flag:02x}"
                )));
            }
            let total = 5 + AEAD_NONCE_SIZE + plain_len + TAG_SIZE;
            if self.buf.len() < total {
                return Ok(());
            }

            let is_final = final_flag == 1;
            let aad = package_aad(self.seq, is_final);
            let (nonce, sealed) = self.buf[5..total].split_at(AEAD_NONCE_SIZE);
            let mut plain = self
                .cipher
                .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad: &aad })
                .map_err(|_| FbError::Auth)?;

            let written = self.inner.write_all(&plain);
            plain.zeroize();
            written.map_err(FbError::from_io)?;

            self.seq += 1;
            self.finished = is_final;
            self.buf.drain(..total);
        }
    }
}

impl<W: Write> Write for DecryptingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.push(data).map_err(FbError::into_io)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ── positional adapter ─────────────────────────────────────────────────────

/// Adapts a sequential [`Write`] consumer to the positional [`RangeSink`]
/// interface a download loop drives.
///
/// The transfer client delivers ranges strictly in order, so offsets carry
/// no information and are ignored. The sink owns header validation: the
/// first two delivered bytes must be the envelope header or the object is
/// not a frostbox stream at all. The header is replayed into `inner` at
/// construction and stripped from the delivered stream, so `inner` sees one
/// well-formed envelope regardless of how the ranges were chunked.
pub struct OffsetSink<W> {
    inner: W,
    state: EnvelopeState,
    header_seen: usize,
}

impl<W: Write> OffsetSink<W> {
    pub fn new(mut inner: W) -> FbResult<Self> {
        inner.write_all(&ENVELOPE_HEADER).map_err(FbError::from_io)?;
        Ok(Self {
            inner,
            state: EnvelopeState::AwaitingHeader,
            header_seen: 0,
        })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> RangeSink for OffsetSink<W> {
    fn write_at(&mut self, _offset: u64, buf: &[u8]) -> FbResult<usize> {
        let mut data = buf;
        if self.state == EnvelopeState::AwaitingHeader {
            while !data.is_empty() && self.header_seen < ENVELOPE_HEADER.len() {
                if data[0] != ENVELOPE_HEADER[self.header_seen] {
                    return Err(FbError::Integrity(format!(
                        "downloaded stream does not begin with the envelope header \
                         (byte {} is 0x{:02x})",
                        self.header_seen, data[0]
                    )));
                }
                self.header_seen += 1;
                data = &data[1..];
            }
            if self.header_seen == ENVELOPE_HEADER.len() {
                self.state = EnvelopeState::Streaming;
            }
        }
        if !data.is_empty() {
            self.inner.write_all(data).map_err(FbError::from_io)?;
        }
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecureBytes {
        SecureBytes::from_vec(vec![7u8; 32])
    }

    fn encrypt(content_key: &SecureBytes, plain: &[u8]) -> Vec<u8> {
        let mut reader = EncryptingReader::new(content_key, plain).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    fn decrypt(content_key: &SecureBytes, stream: &[u8]) -> FbResult<Vec<u8>> {
        let mut writer = DecryptingWriter::new(content_key, Vec::new())?;
        writer.push(stream)?;
        writer.finish()
    }

    #[test]
    fn test_roundtrip_small() {
        let k = key();
        let stream = encrypt(&k, b"hello envelope");
        assert_eq!(stream.len() as u64, encrypted_len(14));
        assert_eq!(&stream[..2], &ENVELOPE_HEADER);
        assert_eq!(decrypt(&k, &stream).unwrap(), b"hello envelope");
    }

    #[test]
    fn test_roundtrip_empty_input() {
        let k = key();
        let stream = encrypt(&k, b"");
        assert_eq!(stream.len() as u64, encrypted_len(0));
        assert_eq!(decrypt(&k, &stream).unwrap(), b"");
    }

    #[test]
    fn test_roundtrip_multi_package() {
        let k = key();
        let plain: Vec<u8> = (0..150 * 1024).map(|i| (i % 251) as u8).collect();
        let stream = encrypt(&k, &plain);
        assert_eq!(stream.len() as u64, encrypted_len(plain.len() as u64));

        // Feed in awkward chunk sizes to exercise partial-package buffering.
        let mut writer = DecryptingWriter::new(&k, Vec::new()).unwrap();
        for chunk in stream.chunks(4099) {
            writer.push(chunk).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), plain);
    }

    #[test]
    fn test_encrypted_len_matches_output() {
        let k = key();
        for len in [0usize, 1, PACKAGE_SIZE - 1, PACKAGE_SIZE, PACKAGE_SIZE + 1] {
            let stream = encrypt(&k, &vec![0xA5; len]);
            assert_eq!(stream.len() as u64, encrypted_len(len as u64), "len {len}");
        }
    }

    #[test]
    fn test_wrong_key_fails_auth() {
        let stream = encrypt(&key(), b"data");
        let other = SecureBytes::from_vec(vec![8u8; 32]);
        match decrypt(&other, &stream) {
            Err(FbError::Auth) => {}
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn test_tampered_package_fails_auth() {
        let k = key();
        let mut stream = encrypt(&k, b"important bytes");
        let mid = stream.len() / 2;
        stream[mid] ^= 0x80;
        match decrypt(&k, &stream) {
            Err(FbError::Auth) => {}
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn test_reordered_packages_fail_auth() {
        let k = key();
        let plain = vec![0x11u8; 2 * PACKAGE_SIZE];
        let stream = encrypt(&k, &plain);

        // Swap the first two (full-size) packages; each authenticates its
        // own sequence number, so the swap must not decrypt.
        let pkg = PACKAGE_SIZE + PACKAGE_OVERHEAD;
        let mut swapped = stream[..2].to_vec();
        swapped.extend_from_slice(&stream[2 + pkg..2 + 2 * pkg]);
        swapped.extend_from_slice(&stream[2..2 + pkg]);
        swapped.extend_from_slice(&stream[2 + 2 * pkg..]);
        match decrypt(&k, &swapped) {
            Err(FbError::Auth) => {}
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_stream_fails_integrity() {
        let k = key();
        let stream = encrypt(&k, b"cut me short");
        let mut writer = DecryptingWriter::new(&k, Vec::new()).unwrap();
        writer.push(&stream[..stream.len() - 10]).unwrap();
        match writer.finish() {
            Err(FbError::Integrity(_)) => {}
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_after_final_package_fails_integrity() {
        let k = key();
        let mut stream = encrypt(&k, b"done");
        stream.extend_from_slice(b"junk");
        match decrypt(&k, &stream) {
            Err(FbError::Integrity(_)) => {}
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_header_fails_format() {
        let k = key();
        let mut stream = encrypt(&k, b"x");
        stream[0] = 0x21;
        match decrypt(&k, &stream) {
            Err(FbError::Format(msg)) => assert!(msg.contains("version")),
            other => panic!("expected Format, got {other:?}"),
        }

        let mut stream = encrypt(&k, b"x");
        stream[1] = 0x01;
        match decrypt(&k, &stream) {
            Err(FbError::Format(msg)) => assert!(msg.contains("cipher")),
            other => panic!("expected Format, got {other:?}"),
        }
    }

    #[test]
    fn test_offset_sink_ignores_offsets_and_strips_header() {
        let k = key();
        let plain: Vec<u8> = (0..70_000).map(|i| (i % 13) as u8).collect();
        let stream = encrypt(&k, &plain);

        let writer = DecryptingWriter::new(&k, Vec::new()).unwrap();
        let mut sink = OffsetSink::new(writer).unwrap();
        // Offsets are deliberately nonsense; delivery order is what counts.
        let bogus = [999u64, 0, 7, 123456];
        for (i, chunk) in stream.chunks(8192).enumerate() {
            let n = sink.write_at(bogus[i % bogus.len()], chunk).unwrap();
            assert_eq!(n, chunk.len());
        }
        assert_eq!(sink.into_inner().finish().unwrap(), plain);
    }

    #[test]
    fn test_offset_sink_rejects_foreign_header() {
        let k = key();
        let writer = DecryptingWriter::new(&k, Vec::new()).unwrap();
        let mut sink = OffsetSink::new(writer).unwrap();
        match sink.write_at(0, b"PK\x03\x04 not an envelope") {
            Err(FbError::Integrity(_)) => {}
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn test_offset_sink_handles_single_byte_first_range() {
        let k = key();
        let stream = encrypt(&k, b"tiny");

        let writer = DecryptingWriter::new(&k, Vec::new()).unwrap();
        let mut sink = OffsetSink::new(writer).unwrap();
        sink.write_at(0, &stream[..1]).unwrap();
        sink.write_at(1, &stream[1..]).unwrap();
        assert_eq!(sink.into_inner().finish().unwrap(), b"tiny");
    }
}
