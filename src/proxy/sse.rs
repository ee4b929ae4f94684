//! # SSE 行解码器
//!
//! 按行切分上游的 `text/event-stream`，只保留 `data:` 行，并重新封装为完整帧

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

const DATA_PREFIX: &[u8] = b"data:";
const DONE_PAYLOAD: &[u8] = b"[DONE]";

/// 一条 `data:` 负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    payload: Bytes,
}

impl SseFrame {
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 流结束标记
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.payload.as_ref() == DONE_PAYLOAD
    }

    /// 编码为 `data: <payload>\n\n`
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        let mut frame = BytesMut::with_capacity(self.payload.len() + 8);
        frame.put_slice(b"data: ");
        frame.put_slice(&self.payload);
        frame.put_slice(b"\n\n");
        frame.freeze()
    }
}

/// 逐行解码，跳过注释、空负载以及 `event:`/`id:` 等字段
#[derive(Debug, Clone, Default)]
pub struct SseLineDecoder;

impl SseLineDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn take_one_line(src: &mut BytesMut) -> Option<BytesMut> {
        let pos = src.iter().position(|b| *b == b'\n')?;
        let mut line = src.split_to(pos + 1);
        line.truncate(line.len() - 1);
        if line.ends_with(b"\r") {
            line.truncate(line.len() - 1);
        }
        Some(line)
    }

    fn process_line(line: BytesMut) -> Option<SseFrame> {
        if !line.starts_with(DATA_PREFIX) {
            return None;
        }
        let mut payload = line.freeze().slice(DATA_PREFIX.len()..);
        if payload.starts_with(b" ") {
            payload = payload.slice(1..);
        }
        if payload.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(SseFrame::new(payload))
    }
}

impl Decoder for SseLineDecoder {
    type Item = SseFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        while let Some(line) = Self::take_one_line(src) {
            if let Some(frame) = Self::process_line(line) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // 末尾没有换行的最后一行
        let mut last = src.split_to(src.len());
        if last.ends_with(b"\r") {
            last.truncate(last.len() - 1);
        }
        Ok(Self::process_line(last))
    }
}
