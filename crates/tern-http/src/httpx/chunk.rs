//! `Transfer-Encoding: chunked` frames.

use super::{MAX_BODY_SIZE, MAX_HEAD_SIZE, ParseError, ParseResult, next_line};

/// Terminal frame with no trailers.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Longest accepted size line, extensions included.
const MAX_SIZE_LINE: usize = 4096;

/// Trailer section limit, matching the head limit.
pub const MAX_TRAILER_SIZE: usize = MAX_HEAD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    Data(&'a [u8]),
    /// The zero-length chunk, trailers consumed.
    Last,
}

/// Decode one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied, or `None` when
/// the frame is not complete yet.
pub fn parse_chunk(buf: &[u8]) -> ParseResult<Option<(Chunk<'_>, usize)>> {
    let Some((size_line, data_start)) = next_line(buf, 0) else {
        if buf.len() > MAX_SIZE_LINE {
            return Err(ParseError::InvalidChunk);
        }
        return Ok(None);
    };
    let size = parse_size(size_line)?;
    if size > MAX_BODY_SIZE {
        return Err(ParseError::BodyTooLarge(MAX_BODY_SIZE));
    }

    if size == 0 {
        let mut at = data_start;
        loop {
            let Some((trailer, next)) = next_line(buf, at) else {
                if buf.len() - data_start > MAX_TRAILER_SIZE {
                    return Err(ParseError::TrailersTooLarge(MAX_TRAILER_SIZE));
                }
                return Ok(None);
            };
            if next - data_start > MAX_TRAILER_SIZE {
                return Err(ParseError::TrailersTooLarge(MAX_TRAILER_SIZE));
            }
            at = next;
            if trailer.is_empty() {
                return Ok(Some((Chunk::Last, at)));
            }
        }
    }

    let data_end = data_start.checked_add(size).ok_or(ParseError::InvalidChunk)?;
    if buf.len() < data_end {
        return Ok(None);
    }
    match next_line(buf, data_end) {
        None => Ok(None),
        Some((rest, _)) if !rest.is_empty() => Err(ParseError::InvalidChunk),
        Some((_, consumed)) => Ok(Some((Chunk::Data(&buf[data_start..data_end]), consumed))),
    }
}

fn parse_size(line: &[u8]) -> ParseResult<usize> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidChunk)?;
    let digits = line.split(';').next().unwrap_or_default().trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidChunk);
    }
    usize::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidChunk)
}

/// Frame `data` as a single chunk. Empty input yields an empty frame
/// list, since a zero-length chunk would end the body.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = format!("{:x}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_chunk_and_terminator() {
        let wire = b"5\r\nhello\r\n0\r\n\r\n";
        let (chunk, used) = parse_chunk(wire).expect("parse").expect("complete");
        assert_eq!(chunk, Chunk::Data(b"hello"));
        assert_eq!(used, 10);
        let (chunk, used) = parse_chunk(&wire[used..]).expect("parse").expect("complete");
        assert_eq!(chunk, Chunk::Last);
        assert_eq!(used, 5);
    }

    #[test]
    fn incomplete_frames_wait() {
        let wire = b"a\r\n0123456789\r\n";
        for cut in 0..wire.len() {
            assert_eq!(parse_chunk(&wire[..cut]), Ok(None), "cut at {cut}");
        }
        assert!(parse_chunk(wire).expect("parse").is_some());
        assert_eq!(parse_chunk(b"0\r\nExpires: never\r\n"), Ok(None));
    }

    #[test]
    fn extensions_and_trailers_are_skipped() {
        let (chunk, _) = parse_chunk(b"3;name=v\r\nabc\r\n")
            .expect("parse")
            .expect("complete");
        assert_eq!(chunk, Chunk::Data(b"abc"));
        let wire = b"0\r\nX-Sum: 1\r\n\r\nnext";
        let (chunk, used) = parse_chunk(wire).expect("parse").expect("complete");
        assert_eq!(chunk, Chunk::Last);
        assert_eq!(&wire[used..], b"next");
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert_eq!(parse_chunk(b"zz\r\n"), Err(ParseError::InvalidChunk));
        assert_eq!(parse_chunk(b"\r\n"), Err(ParseError::InvalidChunk));
        assert_eq!(parse_chunk(b"2\r\nabc\r\n"), Err(ParseError::InvalidChunk));
    }

    #[test]
    fn oversized_trailers_and_chunks_are_rejected() {
        let mut wire = b"0\r\n".to_vec();
        while wire.len() <= MAX_TRAILER_SIZE + 8 {
            wire.extend_from_slice(b"X-Pad: aaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        assert_eq!(
            parse_chunk(&wire),
            Err(ParseError::TrailersTooLarge(MAX_TRAILER_SIZE))
        );

        let mut endless = b"0\r\nX-Pad: ".to_vec();
        endless.resize(MAX_TRAILER_SIZE + 16, b'a');
        assert_eq!(
            parse_chunk(&endless),
            Err(ParseError::TrailersTooLarge(MAX_TRAILER_SIZE))
        );

        let huge = format!("{:x}\r\n", MAX_BODY_SIZE + 1);
        assert_eq!(
            parse_chunk(huge.as_bytes()),
            Err(ParseError::BodyTooLarge(MAX_BODY_SIZE))
        );
    }

    #[test]
    fn encode_matches_parse() {
        assert!(encode_chunk(b"").is_empty());
        let frame = encode_chunk(&[7u8; 300]);
        assert!(frame.starts_with(b"12c\r\n"));
        let (chunk, used) = parse_chunk(&frame).expect("parse").expect("complete");
        assert_eq!(chunk, Chunk::Data(&[7u8; 300][..]));
        assert_eq!(used, frame.len());
    }
}
