use std::{
    cell::Cell,
    fmt::Write,
    io::{self, Cursor, Read, Seek, SeekFrom},
    rc::Rc,
};

use expect_test::{expect, Expect};

use crate::{
    reader::StreamReader,
    tests::{app0, segment, sof, EOI, SOI},
    ErrorKind, MarkerCode,
};

use super::{find_marker, MarkerParser};

/// Lists every marker the parser yields, with the offset its search started at.
fn dump(jpeg: &[u8]) -> String {
    let mut out = String::new();
    let mut reader = match StreamReader::new(Cursor::new(jpeg)) {
        Ok(reader) => reader,
        Err(e) => return format!("error: {e}"),
    };
    let mut parser = MarkerParser::new(&mut reader);

    loop {
        let start = parser.position();
        match parser.next() {
            Some(Ok(marker)) => writeln!(
                out,
                "search@{start} {:?}@{} length={}",
                marker.code(),
                marker.offset(),
                marker.segment_length(),
            )
            .unwrap(),
            Some(Err(e)) => writeln!(out, "error: {e}").unwrap(),
            None => break,
        }
    }

    out
}

fn check(jpeg: &[u8], expect: Expect) {
    expect.assert_eq(&dump(jpeg));
}

#[test]
fn empty() {
    check(
        &[],
        expect![[r#"
            error: no marker found after offset 0 before end of stream
        "#]],
    );
    check(
        &[0xFF],
        expect![[r#"
            error: stream ends in the middle of the marker at offset 0
        "#]],
    );
    check(
        &[0x00, 0x01, 0x02],
        expect![[r#"
            error: no marker found after offset 0 before end of stream
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xD9, // EOI
            0xFF, // trailing
        ],
        expect![[r#"
            search@0 SOI@0 length=0
            search@2 EOI@2 length=0
        "#]],
    );
}

#[test]
fn sequence() {
    let jpeg = [&SOI[..], &app0(1, 72, 72), &sof(0xC0, 16, 32), &EOI].concat();
    check(
        &jpeg,
        expect![[r#"
            search@0 SOI@0 length=0
            search@2 APP0@2 length=16
            search@20 SOF0@20 length=11
            search@33 EOI@33 length=0
        "#]],
    );

    // Running out of data before EOI is an error.
    check(
        &jpeg[..33],
        expect![[r#"
            search@0 SOI@0 length=0
            search@2 APP0@2 length=16
            search@20 SOF0@20 length=11
            error: no marker found after offset 33 before end of stream
        "#]],
    );
}

#[test]
fn scan_data() {
    let jpeg = [
        &SOI[..],
        &sof(0xC0, 16, 32),
        &segment(0xDA, &[1, 1, 0x00, 0, 63, 0]),
        &[0x12u8, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56, 0xFF, 0xFF],
        &EOI,
    ]
    .concat();
    check(
        &jpeg,
        expect![[r#"
            search@0 SOI@0 length=0
            search@2 SOF0@2 length=11
            search@15 SOS@15 length=8
            search@25 RST0@29 length=0
            search@31 EOI@34 length=0
        "#]],
    );
}

#[test]
fn unknown_and_junk() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xF3, 0x00, 0x04, 0xAA, 0xBB, // JPG3, skipped by length
            0x00, 0x00, // junk
            0xFF, 0xFE, 0x00, 0x05, b'h', b'e', b'y', // COM
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            search@0 SOI@0 length=0
            search@2 MarkerCode(f3)@2 length=4
            search@8 COM@10 length=5
            search@17 EOI@17 length=0
        "#]],
    );
}

#[test]
fn truncated() {
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xE1, 0x00, 0x20, // APP1, 30 bytes of payload
            0x01, 0x02, 0x03, // ...but only 3 present
        ],
        expect![[r#"
            search@0 SOI@0 length=0
            error: read of 32 bytes at offset 4 exceeds stream length 9
        "#]],
    );
    check(
        &[
            0xFF, 0xD8, // SOI
            0xFF, 0xC4, 0x00, 0x00, // DHT with a length too small to cover itself
            0xFF, 0xD9, // EOI
        ],
        expect![[r#"
            search@0 SOI@0 length=0
            error: DHT segment at offset 2 has invalid length 0
        "#]],
    );
}

#[test]
fn finder() {
    let data = [0x00u8, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xE0, 0x00, 0xFF, 0xDA];
    let mut reader = StreamReader::new(Cursor::new(&data[..])).unwrap();

    assert_eq!(
        find_marker(&mut reader, 0).unwrap(),
        (MarkerCode::APP0, 5)
    );
    assert_eq!(
        find_marker(&mut reader, 6).unwrap(),
        (MarkerCode::SOS, 8)
    );
    // Starting on a fill byte still finds the same marker.
    assert_eq!(
        find_marker(&mut reader, 4).unwrap(),
        (MarkerCode::APP0, 5)
    );
    assert_eq!(
        find_marker(&mut reader, 9).unwrap_err().kind(),
        ErrorKind::MalformedStream
    );
}

#[test]
fn finder_chunks() {
    // Markers beyond the first chunk are found too.
    let mut data = vec![0x00u8; 10_000];
    data.extend([0xFF, 0xD9]);
    let mut reader = StreamReader::new(Cursor::new(data)).unwrap();
    assert_eq!(
        find_marker(&mut reader, 0).unwrap(),
        (MarkerCode::EOI, 10_000)
    );
}

/// Wraps a stream and counts the bytes read from it.
struct CountingReader<R> {
    inner: R,
    read: Rc<Cell<u64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read.set(self.read.get() + n as u64);
        Ok(n)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn reads_little_scan_data() {
    let mut jpeg = [&SOI[..], &app0(1, 72, 72), &sof(0xC0, 16, 32)].concat();
    jpeg.extend(segment(0xDA, &[1, 1, 0x00, 0, 63, 0]));
    jpeg.extend(std::iter::repeat(0x11u8).take(100_000));
    jpeg.extend(EOI);

    let read = Rc::new(Cell::new(0));
    let stream = CountingReader {
        inner: Cursor::new(&jpeg[..]),
        read: read.clone(),
    };
    let mut reader = StreamReader::new(stream).unwrap();
    let codes = MarkerParser::new(&mut reader)
        .take(4)
        .map(|m| m.map(|m| m.code()))
        .collect::<crate::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(codes.last(), Some(&MarkerCode::SOS));

    // Each search reads a small window, not a whole chunk of the entropy-coded data.
    assert!(read.get() < 1024, "read {} bytes", read.get());
}

#[test]
fn fused() {
    let data = [0xFFu8, 0xD8, 0xFF, 0xC0, 0x00, 0x40];
    let mut reader = StreamReader::new(Cursor::new(&data[..])).unwrap();
    let mut parser = MarkerParser::new(&mut reader);
    assert!(parser.next().unwrap().is_ok());
    assert_eq!(
        parser.next().unwrap().unwrap_err().kind(),
        ErrorKind::OutOfRange
    );
    assert!(parser.next().is_none());
    assert!(parser.next().is_none());
}
