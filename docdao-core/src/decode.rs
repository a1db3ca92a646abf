//! Concurrent, order-preserving decoding of cursor results.
//!
//! Fetching from a cursor is sequential and usually network-bound, while decoding a
//! record into a typed document is CPU-bound and independent per record. The pipeline
//! overlaps the two: each fetched record is handed to a blocking decode task tagged
//! with its sequence index, and the results are put back in fetch order once every
//! task has finished.
//!
//! Guarantees:
//! - output order equals fetch order, whatever order the tasks complete in;
//! - at most [`DecodeConfig::max_in_flight`] decode tasks run per call;
//! - the first decode failure stops further fetching and fails the whole call,
//!   no partial results are returned;
//! - interrupting the [`Context`] returns promptly; queued decodes are cancelled and
//!   decodes already running finish in the background with their results discarded;
//! - the cursor is closed on every exit path.

use std::sync::Arc;

use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};
use tracing::{trace, warn};

use crate::{
    backend::RawCursor,
    config::DecodeConfig,
    context::Context,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
};

type DecodeTaskOutput<D> = (usize, DocumentStoreResult<D>);

/// Drains `cursor` into typed documents, decoding records concurrently.
///
/// The cursor is always closed. When decoding succeeded but closing fails, the close
/// error is returned.
pub async fn decode_cursor<D, C>(
    ctx: &Context,
    mut cursor: C,
    config: &DecodeConfig,
) -> DocumentStoreResult<Vec<D>>
where
    D: Document,
    C: RawCursor,
{
    let decoded = decode_all::<D, C>(ctx, &mut cursor, config).await;
    let closed = cursor.close().await;

    match (decoded, closed) {
        (Ok(documents), Ok(())) => Ok(documents),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "Cursor could not be closed after a failed decode");
            Err(err)
        }
    }
}

async fn decode_all<D, C>(
    ctx: &Context,
    cursor: &mut C,
    config: &DecodeConfig,
) -> DocumentStoreResult<Vec<D>>
where
    D: Document,
    C: RawCursor,
{
    let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
    let mut tasks: JoinSet<DecodeTaskOutput<D>> = JoinSet::new();
    let mut slots: Vec<Option<D>> = Vec::new();
    let mut failure: Option<DocumentStoreError> = None;

    while failure.is_none() {
        // Taking the permit first keeps fetching at most `max_in_flight` records ahead.
        let permit = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = permits.clone().acquire_owned() => permit
                .map_err(|err| DocumentStoreError::Unknown(err.to_string())),
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(err) => {
                tasks.abort_all();
                return Err(err);
            }
        };

        let fetched = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            fetched = cursor.next_document() => fetched,
        };
        let record = match fetched {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(err) => {
                tasks.abort_all();
                return Err(err);
            }
        };

        let index = slots.len();
        slots.push(None);

        tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, D::from_bson_document(record))
        });

        while let Some(joined) = tasks.try_join_next() {
            store_result(joined, &mut slots, &mut failure);
        }
    }

    loop {
        let joined = tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            joined = tasks.join_next() => Ok(joined),
        };

        match joined {
            Ok(Some(joined)) => store_result(joined, &mut slots, &mut failure),
            Ok(None) => break,
            Err(err) => {
                tasks.abort_all();
                return Err(err);
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    trace!(records = slots.len(), document = D::name_plural(), "Decoded cursor");

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| DocumentStoreError::Unknown(format!("record {index} was never decoded")))
        })
        .collect()
}

fn store_result<D>(
    joined: Result<DecodeTaskOutput<D>, JoinError>,
    slots: &mut [Option<D>],
    failure: &mut Option<DocumentStoreError>,
) {
    match joined {
        Ok((index, Ok(document))) => slots[index] = Some(document),
        Ok((_, Err(err))) => {
            failure.get_or_insert(err);
        }
        Err(err) => {
            failure.get_or_insert(DocumentStoreError::Decode(format!("decode task failed: {err}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::{Document as BsonDocument, doc};
    use serde::{Deserialize, Deserializer, Serialize};
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    fn sleep_then_read<'de, De: Deserializer<'de>>(deserializer: De) -> Result<i64, De::Error> {
        let millis = i64::deserialize(deserializer)?;
        std::thread::sleep(Duration::from_millis(millis as u64));
        Ok(millis)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        seq: i64,
        #[serde(deserialize_with = "sleep_then_read")]
        delay: i64,
    }

    impl Document for Reading {
        fn collection_name() -> &'static str {
            "readings"
        }

        fn name_singular() -> &'static str {
            "reading"
        }

        fn name_plural() -> &'static str {
            "readings"
        }
    }

    static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
    static PEAK: AtomicUsize = AtomicUsize::new(0);

    fn track_in_flight<'de, De: Deserializer<'de>>(deserializer: De) -> Result<i64, De::Error> {
        let current = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
        PEAK.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
        i64::deserialize(deserializer)
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tracked {
        #[serde(deserialize_with = "track_in_flight")]
        seq: i64,
    }

    impl Document for Tracked {
        fn collection_name() -> &'static str {
            "tracked"
        }

        fn name_singular() -> &'static str {
            "tracked"
        }

        fn name_plural() -> &'static str {
            "tracked"
        }
    }

    struct ScriptedCursor {
        records: VecDeque<DocumentStoreResult<BsonDocument>>,
        stall_when_empty: bool,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedCursor {
        fn new(records: Vec<BsonDocument>) -> (Self, Arc<AtomicBool>) {
            Self::scripted(records.into_iter().map(Ok).collect(), false)
        }

        fn scripted(
            records: Vec<DocumentStoreResult<BsonDocument>>,
            stall_when_empty: bool,
        ) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            let cursor = Self {
                records: records.into(),
                stall_when_empty,
                closed: closed.clone(),
            };
            (cursor, closed)
        }
    }

    #[async_trait]
    impl RawCursor for ScriptedCursor {
        async fn next_document(&mut self) -> DocumentStoreResult<Option<BsonDocument>> {
            match self.records.pop_front() {
                Some(record) => record.map(Some),
                None if self.stall_when_empty => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(self) -> DocumentStoreResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn readings(count: i64) -> Vec<BsonDocument> {
        // Earlier records take longer, so decode tasks finish in reverse order.
        (0..count)
            .map(|seq| doc! { "seq": seq, "delay": (count - seq) * 3 })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn preserves_fetch_order() {
        for count in [0, 1, 2, 7, 24] {
            let (cursor, closed) = ScriptedCursor::new(readings(count));

            let decoded: Vec<Reading> =
                decode_cursor(&Context::background(), cursor, &DecodeConfig::new(8))
                    .await
                    .unwrap();

            let sequence = decoded.iter().map(|r| r.seq).collect::<Vec<_>>();
            assert_eq!(sequence, (0..count).collect::<Vec<_>>());
            assert!(closed.load(Ordering::SeqCst));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn any_single_failure_aborts_the_call() {
        let count = 6;

        for broken in 0..count {
            let mut records = readings(count as i64);
            records[broken] = doc! { "seq": "not a number", "delay": 0 };
            let (cursor, closed) = ScriptedCursor::new(records);

            let result: DocumentStoreResult<Vec<Reading>> =
                decode_cursor(&Context::background(), cursor, &DecodeConfig::new(3)).await;

            assert!(matches!(result, Err(DocumentStoreError::Decode(_))), "record {broken}");
            assert!(closed.load(Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn fetch_error_is_propagated_and_cursor_closed() {
        let (cursor, closed) = ScriptedCursor::scripted(
            vec![
                Ok(doc! { "seq": 0, "delay": 0 }),
                Err(DocumentStoreError::Backend("connection reset".into())),
            ],
            false,
        );

        let result: DocumentStoreResult<Vec<Reading>> =
            decode_cursor(&Context::background(), cursor, &DecodeConfig::new(2)).await;

        assert_eq!(result.unwrap_err(), DocumentStoreError::Backend("connection reset".into()));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn deadline_interrupts_a_stalled_cursor() {
        let (cursor, closed) =
            ScriptedCursor::scripted(vec![Ok(doc! { "seq": 0, "delay": 0 })], true);
        let ctx = Context::background().with_timeout(Duration::from_millis(30));

        let result: DocumentStoreResult<Vec<Reading>> =
            decode_cursor(&ctx, cursor, &DecodeConfig::new(2)).await;

        assert_eq!(result.unwrap_err(), DocumentStoreError::DeadlineExceeded);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_stays_within_bound() {
        let records = (0..20).map(|seq| doc! { "seq": seq }).collect();
        let (cursor, _closed) = ScriptedCursor::new(records);

        let decoded: Vec<Tracked> =
            decode_cursor(&Context::background(), cursor, &DecodeConfig::new(2))
                .await
                .unwrap();

        assert_eq!(decoded.len(), 20);
        assert!(PEAK.load(Ordering::SeqCst) <= 2);
    }
}
