use crate::core::{
    batch::BatchBuilder,
    error::PipelineError,
    pipeline::Pipeline,
    resolver::Intent,
};
use arrow_ipc::writer::StreamWriter;
use bytes::Bytes;
use futures::{channel::mpsc, SinkExt, Stream};
use log::{debug, warn};
use lumenlake_common::rows::RowKind;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{
    io,
    str::FromStr,
    sync::{Arc, Mutex},
};

// Byte sink shared with the arrow writer; drained into response chunks
// after every record batch so the client can decode incrementally.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn drain(&self) -> Bytes {
        let mut guard = self.0.lock().expect("stream buffer");
        Bytes::from(std::mem::take(&mut *guard))
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("stream buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Resolve the intent, then emit the Arrow IPC stream: schema first, then
// every cold partition in scope in ledger order, then the hot tail that
// has not been flushed yet.
pub async fn dataset_stream(
    pipeline: Arc<Pipeline>,
    dataset: String,
    intent: Intent,
) -> Result<impl Stream<Item = Result<Bytes, actix_web::Error>>, PipelineError> {
    let kind = RowKind::from_str(&dataset)
        .map_err(|_| PipelineError::DatasetNotFound(dataset.clone()))?;
    let resolved = pipeline.resolver.resolve(&pipeline.catalog, &dataset, &intent)?;

    let (mut sender, receiver) = mpsc::channel::<Result<Bytes, actix_web::Error>>(8);

    actix_web::rt::spawn(async move {
        if let Err(e) = pump(&pipeline, kind, &dataset, &intent, &resolved.era_id, &resolved.version_label, &mut sender).await {
            warn!("stream of {} aborted: {} (kind {})", dataset, e, e.kind().as_str());
            let _ = sender
                .send(Err(actix_web::error::ErrorInternalServerError(format!(
                    "{} (kind {})",
                    e,
                    e.kind().as_str()
                ))))
                .await;
        }
    });

    Ok(receiver)
}

#[allow(clippy::too_many_arguments)]
async fn pump(
    pipeline: &Pipeline,
    kind: RowKind,
    dataset: &str,
    intent: &Intent,
    era_id: &str,
    version_label: &str,
    sender: &mut mpsc::Sender<Result<Bytes, actix_web::Error>>,
) -> Result<(), PipelineError> {
    let schema = Arc::new(kind.schema().arrow_schema());
    let buf = SharedBuf::default();
    let mut writer = StreamWriter::try_new(buf.clone(), &schema)?;

    // Schema descriptor goes out first, on its own
    if sender.send(Ok(buf.drain())).await.is_err() {
        return Ok(());
    }

    let mut partitions =
        pipeline
            .catalog
            .list_partitions(dataset, Some(era_id), Some(version_label))?;
    if let Some((start, end)) = intent.range {
        partitions.retain(|p| p.overlaps(start, end));
    }
    partitions.sort_by_key(|p| (p.ledger_start, p.id));

    let mut cold_tail = 0u32;
    for partition in &partitions {
        let bytes = pipeline.lake.get(&partition.file_path).await?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
        for batch in reader {
            writer.write(&batch?)?;
            if sender.send(Ok(buf.drain())).await.is_err() {
                return Ok(());
            }
        }
        cold_tail = cold_tail.max(partition.ledger_end);
    }

    // Hot tail: everything extracted but not yet flushed, within range
    let upper = intent.range.map(|(_, end)| end).unwrap_or(u32::MAX);
    if upper > cold_tail {
        let rows = pipeline.hot.scan_upto(kind, upper)?;
        let mut builder = BatchBuilder::new(
            kind,
            pipeline.config.batch_max_rows,
            pipeline.config.batch_max_bytes,
        );
        for row in rows {
            let sequence = row.ledger_sequence();
            if sequence <= cold_tail {
                continue;
            }
            if let Some((start, _)) = intent.range {
                if sequence < start {
                    continue;
                }
            }
            if builder.add(&row)? == crate::core::batch::BatchStatus::Full {
                if let Some(block) = builder.build()? {
                    writer.write(&block.columns)?;
                    if sender.send(Ok(buf.drain())).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        if let Some(block) = builder.build()? {
            writer.write(&block.columns)?;
            if sender.send(Ok(buf.drain())).await.is_err() {
                return Ok(());
            }
        }
    }

    writer.finish()?;
    let _ = sender.send(Ok(buf.drain())).await;
    debug!(
        "streamed {} partitions of {} ({} era {})",
        partitions.len(),
        dataset,
        version_label,
        era_id
    );
    Ok(())
}
