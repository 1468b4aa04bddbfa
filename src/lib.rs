use anyhow::{bail, Error};
use serde_json::Value;
use std::{collections::HashMap, future::Future, mem::replace};
use tracing::{debug, info};

pub mod clients;

pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// A single-use update message under construction. A fresh instance is
/// obtained from the client for every flush/commit cycle and never reused.
pub trait UpdateRequest {
    type Document;

    fn create_document(
        &self,
        fields: HashMap<String, Value>,
        boosts: HashMap<String, f32>,
    ) -> Self::Document;

    fn add_documents(
        &mut self,
        documents: &[Self::Document],
        overwrite: Option<bool>,
        commit_within: Option<u64>,
    );

    fn add_commit(
        &mut self,
        wait_flush: Option<bool>,
        wait_searcher: Option<bool>,
        expunge_deletes: Option<bool>,
    );
}

/// Hands out fresh update requests and submits finished ones to the search
/// service.
pub trait UpdateClient {
    type Request: UpdateRequest;
    type Response;

    fn create_update(&self) -> Self::Request;

    fn submit(
        &self,
        request: Self::Request,
    ) -> impl Future<Output = Result<Self::Response, Error>> + Send;
}

pub type DocumentOf<C> = <<C as UpdateClient>::Request as UpdateRequest>::Document;

#[derive(Debug)]
pub enum BufferEvent<'a, D, R> {
    FlushStart { documents: &'a [D] },
    FlushEnd { result: &'a R },
    CommitStart { documents: &'a [D] },
    CommitEnd { result: &'a R },
}

/// Fire-and-forget observer of buffer activity. Return values are never
/// consumed; a sink cannot veto or alter a flush.
pub trait EventSink<D, R> {
    fn notify(&self, event: BufferEvent<'_, D, R>);
}

pub struct NoopSink;

impl<D, R> EventSink<D, R> for NoopSink {
    fn notify(&self, _event: BufferEvent<'_, D, R>) {}
}

pub struct LogSink;

impl<D, R> EventSink<D, R> for LogSink {
    fn notify(&self, event: BufferEvent<'_, D, R>) {
        match event {
            BufferEvent::FlushStart { documents } => {
                debug!("Flush started, batch size: {}", documents.len())
            }
            BufferEvent::FlushEnd { .. } => debug!("Flush complete"),
            BufferEvent::CommitStart { documents } => {
                debug!("Commit started, batch size: {}", documents.len())
            }
            BufferEvent::CommitEnd { .. } => debug!("Commit complete"),
        }
    }
}

/// Buffers documents and submits them in batches once the configured buffer
/// size is reached.
///
/// Adding documents one by one produces one update request per document;
/// batching them amortizes the round trip to the search service. The buffer
/// never holds more than `buffer_size` documents: the add that reaches the
/// threshold flushes synchronously before returning.
pub struct BufferedAdd<C, S>
where
    C: UpdateClient,
{
    client: C,
    sink: S,
    update: C::Request,
    buffer: Vec<DocumentOf<C>>,
    buffer_size: usize,
}

impl<C, S> BufferedAdd<C, S>
where
    C: UpdateClient,
    S: EventSink<DocumentOf<C>, C::Response>,
{
    pub fn new(client: C, sink: S) -> Self {
        let update = client.create_update();
        Self {
            client,
            sink,
            update,
            buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the threshold at which buffered documents are flushed
    /// automatically. Zero is rejected.
    pub fn set_buffer_size(&mut self, size: usize) -> Result<&mut Self, Error> {
        if size == 0 {
            bail!("buffer size must be greater than zero");
        }
        self.buffer_size = size;
        Ok(self)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Documents currently waiting to be flushed, in insertion order.
    /// Previously flushed documents are not included.
    pub fn documents(&self) -> &[DocumentOf<C>] {
        &self.buffer
    }

    /// Create a document through the current update request and add it to the
    /// buffer.
    pub async fn create_document(
        &mut self,
        fields: HashMap<String, Value>,
        boosts: HashMap<String, f32>,
    ) -> Result<&mut Self, Error> {
        let document = self.update.create_document(fields, boosts);
        self.add_document(document).await
    }

    /// Add a document to the buffer, flushing if the buffer size is reached.
    pub async fn add_document(&mut self, document: DocumentOf<C>) -> Result<&mut Self, Error> {
        self.buffer.push(document);
        if self.buffer.len() == self.buffer_size {
            debug!("Buffer reached {} documents, flushing...", self.buffer_size);
            self.flush(None, None).await?;
        }
        Ok(self)
    }

    /// Add documents one at a time; an input longer than the buffer size
    /// triggers multiple flushes mid-iteration.
    pub async fn add_documents(
        &mut self,
        documents: impl IntoIterator<Item = DocumentOf<C>>,
    ) -> Result<&mut Self, Error> {
        for document in documents {
            self.add_document(document).await?;
        }
        Ok(self)
    }

    /// Drop all pending documents and start over with a fresh update request,
    /// so a partially configured request never carries into the next cycle.
    pub fn clear(&mut self) -> &mut Self {
        self.update = self.client.create_update();
        self.buffer.clear();
        self
    }

    /// Submit the pending documents without a commit directive.
    ///
    /// Returns `Ok(None)` when the buffer is empty: nothing is submitted and
    /// no events are raised. When the submit fails the error propagates and
    /// the pending documents stay in the buffer.
    pub async fn flush(
        &mut self,
        overwrite: Option<bool>,
        commit_within: Option<u64>,
    ) -> Result<Option<C::Response>, Error> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        self.sink.notify(BufferEvent::FlushStart {
            documents: &self.buffer,
        });

        let mut request = replace(&mut self.update, self.client.create_update());
        request.add_documents(&self.buffer, overwrite, commit_within);
        let result = self.client.submit(request).await?;

        info!("Flushed {} documents", self.buffer.len());
        self.buffer.clear();

        self.sink.notify(BufferEvent::FlushEnd { result: &result });

        Ok(Some(result))
    }

    /// Submit the pending documents together with a commit directive.
    ///
    /// Unlike [`flush`](Self::flush) this never short-circuits on an empty
    /// buffer: a bare commit is the way to force the search engine to make
    /// prior updates visible without adding documents.
    pub async fn commit(
        &mut self,
        overwrite: Option<bool>,
        wait_flush: Option<bool>,
        wait_searcher: Option<bool>,
        expunge_deletes: Option<bool>,
    ) -> Result<C::Response, Error> {
        self.sink.notify(BufferEvent::CommitStart {
            documents: &self.buffer,
        });

        let mut request = replace(&mut self.update, self.client.create_update());
        request.add_documents(&self.buffer, overwrite, None);
        request.add_commit(wait_flush, wait_searcher, expunge_deletes);
        let result = self.client.submit(request).await?;

        info!("Committed {} documents", self.buffer.len());
        self.buffer.clear();

        self.sink.notify(BufferEvent::CommitEnd { result: &result });

        Ok(result)
    }
}
