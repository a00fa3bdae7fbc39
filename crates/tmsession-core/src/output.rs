use tokio::io::AsyncRead;
use tokio_stream::StreamExt;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};

/// Splits worker output into lines; invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, Default)]
pub struct LineCodec;

impl LineCodec {
    fn take_line(src: &mut BytesMut, len: usize, consumed: usize) -> String {
        let mut line = &src[..len];
        if line.last() == Some(&b'\r') {
            line = &line[..len - 1];
        }
        let text = String::from_utf8_lossy(line).into_owned();
        src.advance(consumed);
        text
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| *b == b'\n') {
            Some(newline) => Ok(Some(Self::take_line(src, newline, newline + 1))),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let len = src.len();
        Ok(Some(Self::take_line(src, len, len)))
    }
}

/// Feed every line of `io` to `on_line` until end of stream.
pub async fn for_each_line<R, F>(io: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut frames = FramedRead::with_capacity(io, LineCodec, 1024);
    while let Some(frame) = frames.next().await {
        on_line(frame?.as_str());
    }
    Ok(())
}
