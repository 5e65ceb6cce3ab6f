// SPDX-License-Identifier: MIT

//! Hashing while reading.

use std::io;
use std::pin::Pin;
use std::task::Poll;

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{Algorithm, Context, Hash};

pin_project! {
    /// Passes reads through to `inner` and digests every byte on the way.
    ///
    /// Lets a consumer buffer or forward content and learn its digest from
    /// the same single read.
    #[derive(Debug)]
    pub struct HashingReader<R> {
        #[pin]
        inner: R,
        ctx: Context,
        read: u64,
    }
}

impl<R> HashingReader<R> {
    pub fn new(inner: R, algorithm: Algorithm) -> Self {
        HashingReader {
            inner,
            ctx: Context::new(algorithm),
            read: 0,
        }
    }

    /// Byte count and digest of everything read so far.
    pub fn snapshot(&self) -> (u64, Hash) {
        (self.read, self.ctx.clone().finish())
    }

    pub fn finish(self) -> (u64, Hash) {
        (self.read, self.ctx.finish())
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let start = buf.filled().len();
        let polled = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            let fresh = &buf.filled()[start..];
            this.ctx.update(fresh);
            *this.read += fresh.len() as u64;
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn digest_matches_content_read() {
        let mut reader = HashingReader::new(&b"foo"[..], Algorithm::SHA1);
        let mut first = [0u8; 2];
        reader.read_exact(&mut first).await.unwrap();
        assert_eq!(reader.snapshot(), (2, Algorithm::SHA1.digest("fo")));

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"o");
        assert_eq!(
            reader.finish(),
            (3, "0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn empty_input() {
        let mut reader = HashingReader::new(tokio::io::empty(), Algorithm::SHA256);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(reader.finish(), (0, Algorithm::SHA256.digest("")));
    }
}
