//! Response translation, streaming mode
//!
//! Upstream chunks are arbitrary byte cuts. [`FrameDecoder`] buffers them
//! and hands out complete provider frames; [`DeltaReader`] decodes those
//! frames into deltas; [`translate_stream`] turns deltas into OpenAI chunks.
//!
//! Every output stream ends with exactly one terminal event: `[DONE]` after a
//! clean end, or an error frame after a transport failure or cancellation.

use crate::config::StreamFraming;
use crate::http::ChunkStream;
use crate::protocol::{
    ChatCompletion, ChatCompletionChunk, ChunkChoice, MessageDelta, MessageRole, StreamEvent,
};
use crate::providers::error::{GatewayError, GatewayResult};
use crate::providers::response::{
    DeltaAccumulator, FrameDelta, ResponseContext, ResponseDecoder, DEFAULT_FINISH_REASON,
};
use async_stream::stream;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outbound event stream handed to the façade
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

const DONE_MARKER: &[u8] = b"[DONE]";
const DATA_FIELD: &[u8] = b"data:";

/// One complete provider frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Frame payload, still undecoded
    Data(Bytes),
    /// The provider's `[DONE]` marker
    Done,
}

/// Reassembles provider frames from arbitrarily cut chunks.
///
/// For SSE, consecutive `data:` lines form one event and are joined with
/// `\n`; the event is handed out at the blank line that ends it. Providers
/// that omit the blank line still work: a new `data:` line closes a pending
/// event whose payload is already a complete JSON value.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: StreamFraming,
    buffer: BytesMut,
    event: BytesMut,
    event_open: bool,
}

impl FrameDecoder {
    pub fn new(framing: StreamFraming) -> Self {
        Self {
            framing,
            buffer: BytesMut::new(),
            event: BytesMut::new(),
            event_open: false,
        }
    }

    /// Append a chunk and take every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1).freeze();
            line.truncate(pos);
            self.take_line(line, &mut frames);
        }
        frames
    }

    /// Decode whatever is left once the upstream closed cleanly
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let rest = self.buffer.split().freeze();
        if !rest.is_empty() {
            self.take_line(rest, &mut frames);
        }
        frames.extend(self.dispatch());
        frames
    }

    /// Bytes buffered without a frame end yet
    pub fn pending(&self) -> usize {
        self.buffer.len() + self.event.len()
    }

    fn take_line(&mut self, mut line: Bytes, frames: &mut Vec<Frame>) {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        match self.framing {
            StreamFraming::Ndjson => frames.extend(classify(line)),
            StreamFraming::Sse => {
                if line.is_empty() {
                    frames.extend(self.dispatch());
                    return;
                }
                // `event:`, `id:`, `retry:` and `:` comment lines carry nothing we use
                if !line.starts_with(DATA_FIELD) {
                    return;
                }
                line.advance(DATA_FIELD.len());
                if line.first() == Some(&b' ') {
                    line.advance(1);
                }

                if line.trim_ascii() == DONE_MARKER {
                    frames.extend(self.dispatch());
                    frames.push(Frame::Done);
                    return;
                }
                if self.event_open && serde_json::from_slice::<Value>(&self.event).is_ok() {
                    frames.extend(self.dispatch());
                }
                if self.event_open {
                    self.event.extend_from_slice(b"\n");
                }
                self.event.extend_from_slice(&line);
                self.event_open = true;
            }
        }
    }

    fn dispatch(&mut self) -> Option<Frame> {
        self.event_open = false;
        let data = self.event.split().freeze();
        classify(data)
    }
}

fn classify(payload: Bytes) -> Option<Frame> {
    let trimmed = payload.trim_ascii();
    if trimmed.is_empty() {
        None
    } else if trimmed == DONE_MARKER {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload))
    }
}

/// Pulls decoded deltas out of an upstream chunk stream.
///
/// The upstream is dropped, closing the connection, as soon as the provider
/// signals the end.
pub struct DeltaReader {
    upstream: Option<ChunkStream>,
    frames: FrameDecoder,
    decoder: ResponseDecoder,
    pending: VecDeque<FrameDelta>,
    skipped: usize,
}

impl DeltaReader {
    pub fn new(upstream: ChunkStream, decoder: ResponseDecoder, framing: StreamFraming) -> Self {
        Self {
            upstream: Some(upstream),
            frames: FrameDecoder::new(framing),
            decoder,
            pending: VecDeque::new(),
            skipped: 0,
        }
    }

    /// Next delta, `Ok(None)` at the end of the stream.
    ///
    /// Waiting on the upstream is the only suspension point; `cancel` is
    /// observed there.
    pub async fn next(&mut self, cancel: &CancellationToken) -> GatewayResult<Option<FrameDelta>> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                return Ok(Some(delta));
            }
            let Some(upstream) = self.upstream.as_mut() else {
                return Ok(None);
            };

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(GatewayError::Cancelled),
                next = upstream.next() => Ok(next),
            };

            match next {
                Ok(Some(Ok(chunk))) => {
                    let frames = self.frames.push(&chunk);
                    self.decode(frames);
                }
                Ok(Some(Err(err))) | Err(err) => {
                    self.upstream = None;
                    return Err(err);
                }
                Ok(None) => {
                    let frames = self.frames.finish();
                    self.decode(frames);
                    self.upstream = None;
                }
            }
        }
    }

    /// Frames that could not be decoded so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if self.upstream.is_none() {
                break;
            }
            match frame {
                Frame::Done => self.upstream = None,
                Frame::Data(data) => match serde_json::from_slice::<Value>(&data) {
                    Ok(value) => {
                        if let Some(delta) = self.decoder.decode_frame(&value) {
                            if delta.done {
                                self.upstream = None;
                            }
                            self.pending.push_back(delta);
                        }
                    }
                    Err(e) => {
                        self.skipped += 1;
                        warn!(error = %e, len = data.len(), "Skipping undecodable stream frame");
                    }
                },
            }
        }
    }
}

/// Builds the OpenAI chunks of one response
#[derive(Debug)]
pub struct ChunkEmitter {
    ctx: ResponseContext,
    next_index: u64,
    acc: DeltaAccumulator,
}

impl ChunkEmitter {
    pub fn new(ctx: ResponseContext) -> Self {
        Self {
            ctx,
            next_index: 0,
            acc: DeltaAccumulator::default(),
        }
    }

    /// Chunk for one decoded delta, if it carries anything to show.
    ///
    /// The first chunk always announces the assistant role.
    pub fn push(&mut self, delta: &FrameDelta) -> Option<StreamEvent> {
        self.acc.push(delta);

        let content = delta.content.as_deref().filter(|c| !c.is_empty());
        if content.is_none() && self.next_index > 0 {
            return None;
        }
        Some(self.chunk(
            MessageDelta {
                role: None,
                content: content.map(str::to_string),
            },
            None,
        ))
    }

    /// Final chunk with the finish reason and provider usage, then `[DONE]`
    pub fn finish(mut self) -> [StreamEvent; 2] {
        let finish_reason = self
            .acc
            .finish_reason()
            .unwrap_or(DEFAULT_FINISH_REASON)
            .to_string();
        let usage = self.acc.usage();

        let mut last = self.chunk(MessageDelta::default(), Some(finish_reason));
        if let StreamEvent::Chunk { chunk, .. } = &mut last {
            chunk.usage = usage;
        }
        [last, StreamEvent::Done]
    }

    /// Number of chunks emitted so far
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    fn chunk(&mut self, mut delta: MessageDelta, finish_reason: Option<String>) -> StreamEvent {
        if self.next_index == 0 {
            delta.role = Some(MessageRole::Assistant);
        }
        let index = self.next_index;
        self.next_index += 1;

        StreamEvent::Chunk {
            index,
            chunk: ChatCompletionChunk {
                id: self.ctx.id.clone(),
                object: "chat.completion.chunk".to_string(),
                created: self.ctx.created,
                model: self.ctx.model.clone(),
                choices: vec![ChunkChoice {
                    index: 0,
                    delta,
                    finish_reason,
                }],
                usage: None,
            },
        }
    }
}

/// Translate a live upstream stream into OpenAI events
pub fn translate_stream(
    upstream: ChunkStream,
    decoder: ResponseDecoder,
    framing: StreamFraming,
    ctx: ResponseContext,
    cancel: CancellationToken,
) -> EventStream {
    Box::pin(stream! {
        let id = ctx.id.clone();
        let mut reader = DeltaReader::new(upstream, decoder, framing);
        let mut emitter = ChunkEmitter::new(ctx);

        loop {
            match reader.next(&cancel).await {
                Ok(Some(delta)) => {
                    if let Some(event) = emitter.push(&delta) {
                        yield event;
                    }
                }
                Ok(None) => {
                    debug!(id = %id, chunks = emitter.emitted(), skipped = reader.skipped(), "Stream finished");
                    for event in emitter.finish() {
                        yield event;
                    }
                    break;
                }
                Err(err) => {
                    warn!(id = %id, chunks = emitter.emitted(), code = err.code(), error = %err, "Stream ended with error");
                    yield StreamEvent::Error(err.to_envelope());
                    break;
                }
            }
        }
    })
}

/// Drain a live upstream stream into one completion
pub async fn collect_stream(
    upstream: ChunkStream,
    decoder: ResponseDecoder,
    framing: StreamFraming,
    ctx: &ResponseContext,
    cancel: &CancellationToken,
) -> GatewayResult<ChatCompletion> {
    let mut reader = DeltaReader::new(upstream, decoder, framing);
    let mut acc = DeltaAccumulator::default();

    while let Some(delta) = reader.next(cancel).await? {
        acc.push(&delta);
    }

    debug!(id = %ctx.id, len = acc.content().len(), "Collected upstream stream");
    Ok(acc.into_completion(ctx))
}

/// Present a single completion as a stream: one content chunk, one final
/// chunk, then `[DONE]`
pub fn emulate_stream(completion: ChatCompletion) -> EventStream {
    let ctx = ResponseContext {
        id: completion.id.clone(),
        model: completion.model.clone(),
        created: completion.created,
        prompt_tokens: 0,
    };
    let choice = completion.choices.into_iter().next();

    let mut emitter = ChunkEmitter::new(ctx);
    let mut events = Vec::with_capacity(3);
    let delta = FrameDelta {
        content: choice.as_ref().map(|c| c.message.content.clone()),
        finish_reason: choice.and_then(|c| c.finish_reason),
        usage: completion.usage,
        ..FrameDelta::default()
    };
    events.extend(emitter.push(&delta));
    events.extend(emitter.finish());

    Box::pin(futures::stream::iter(events))
}
