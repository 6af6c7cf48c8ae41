//! Bridges testcontainers log frames to a [`LogSink`].

use futures::future::BoxFuture;
use std::sync::Arc;
use testbed_core::ports::{LogSink, StreamOrigin};
use testcontainers::core::logs::LogFrame;
use testcontainers::core::logs::consumer::LogConsumer;

/// Log consumer handing every frame to a [`LogSink`].
pub struct SinkLogConsumer {
    sink: Arc<dyn LogSink>,
}

impl SinkLogConsumer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl LogConsumer for SinkLogConsumer {
    fn accept<'a>(&'a self, record: &'a LogFrame) -> BoxFuture<'a, ()> {
        let origin = match record {
            LogFrame::StdOut(_) => StreamOrigin::Stdout,
            LogFrame::StdErr(_) => StreamOrigin::Stderr,
        };
        self.sink.accept(origin, record.bytes());
        Box::pin(futures::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(StreamOrigin, Vec<u8>)>>);

    impl LogSink for Collect {
        fn accept(&self, origin: StreamOrigin, chunk: &[u8]) {
            self.0.lock().unwrap().push((origin, chunk.to_vec()));
        }
    }

    #[tokio::test]
    async fn test_frames_keep_their_stream() {
        let sink = Arc::new(Collect::default());
        let consumer = SinkLogConsumer::new(sink.clone());

        consumer
            .accept(&LogFrame::StdOut(b"ready\n".to_vec().into()))
            .await;
        consumer
            .accept(&LogFrame::StdErr(b"warning\n".to_vec().into()))
            .await;

        let frames = sink.0.lock().unwrap().clone();
        assert_eq!(
            frames,
            vec![
                (StreamOrigin::Stdout, b"ready\n".to_vec()),
                (StreamOrigin::Stderr, b"warning\n".to_vec()),
            ]
        );
    }
}
