//! Caller-side view of one submitted request.

use crate::error::PipelineError;
use crate::producers::{Consumer, ProducerContext, RequestId, Shareable, Status};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One event of a request, in delivery order.
#[derive(Debug)]
pub enum PipelineEvent<T> {
    /// A progressive or lower-quality result; more will follow.
    Intermediate(T),
    /// The last result. `None` means no tier the request may reach had the
    /// image.
    Final(Option<T>),
    Failure(PipelineError),
    Cancelled,
    /// Progress between 0.0 and 1.0.
    Progress(f32),
}

impl<T> PipelineEvent<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::Failure(_) | Self::Cancelled)
    }
}

/// Receives the events of one request.
///
/// Dropping a data source before its terminal event cancels the request.
pub struct DataSource<T> {
    events: mpsc::UnboundedReceiver<PipelineEvent<T>>,
    context: Arc<ProducerContext>,
    finished: bool,
}

impl<T> DataSource<T> {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<PipelineEvent<T>>,
        context: Arc<ProducerContext>,
    ) -> Self {
        Self {
            events,
            context,
            finished: false,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.context.id()
    }

    /// Whether the terminal event has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Request cancellation. A `Cancelled` event follows unless the request
    /// already finished.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    /// Next event, or `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<PipelineEvent<T>> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        if event.as_ref().map_or(true, PipelineEvent::is_terminal) {
            self.finished = true;
        }
        event
    }

    /// Wait for the terminal event, discarding intermediates.
    ///
    /// Cancellation is reported as [`PipelineError::Cancelled`].
    pub async fn result(mut self) -> Result<Option<T>, PipelineError> {
        while let Some(event) = self.next_event().await {
            match event {
                PipelineEvent::Final(value) => return Ok(value),
                PipelineEvent::Failure(error) => return Err(error),
                PipelineEvent::Cancelled => return Err(PipelineError::Cancelled),
                PipelineEvent::Intermediate(_) | PipelineEvent::Progress(_) => {}
            }
        }
        Err(PipelineError::Cancelled)
    }
}

impl<T> Drop for DataSource<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.context.cancel();
        }
    }
}

/// Consumer at the top of a chain, forwarding into a [`DataSource`].
pub(crate) struct ChannelConsumer<T> {
    events: mpsc::UnboundedSender<PipelineEvent<T>>,
}

impl<T> ChannelConsumer<T> {
    pub fn new(events: mpsc::UnboundedSender<PipelineEvent<T>>) -> Self {
        Self { events }
    }

    fn send(&self, event: PipelineEvent<T>) {
        // The receiver is gone once the caller dropped the data source.
        let _ = self.events.send(event);
    }
}

impl<T: Shareable + Send + Sync + 'static> Consumer<T> for ChannelConsumer<T> {
    fn on_new_result(&self, result: Option<&T>, status: Status) {
        let value = result.and_then(Shareable::share);
        if status.is_last() {
            self.send(PipelineEvent::Final(value));
        } else if let Some(value) = value {
            self.send(PipelineEvent::Intermediate(value));
        }
    }

    fn on_failure(&self, error: PipelineError) {
        self.send(PipelineEvent::Failure(error));
    }

    fn on_cancellation(&self) {
        self.send(PipelineEvent::Cancelled);
    }

    fn on_progress_update(&self, progress: f32) {
        self.send(PipelineEvent::Progress(progress));
    }
}
