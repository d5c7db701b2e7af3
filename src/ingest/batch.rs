use bson::{Bson, Document};
use crossbeam_channel::{Receiver, Sender};

use crate::cancel::Cancellation;

/// One bulk-write unit: documents in arrival order.
#[derive(Debug)]
pub struct Batch {
    pub docs: Vec<Document>,
}

/// Soft ceiling on the accumulated document bytes per batch.
pub const MAX_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// Groups decoded documents into batches bounded by count and by byte
/// budget, emitting them in arrival order. Returns when the document
/// channel closes or the run is cancelled.
pub fn run_batcher(
    docs: &Receiver<Document>,
    batches: &Sender<Batch>,
    batch_size: usize,
    cancel: &Cancellation,
) {
    let mut buffer = Vec::with_capacity(batch_size);
    let mut bytes = 0usize;
    for doc in docs {
        if cancel.is_cancelled() {
            // Dropping the receiver unblocks the decoders behind us.
            return;
        }
        bytes += approx_size(&doc);
        buffer.push(doc);
        if buffer.len() >= batch_size || bytes >= MAX_BATCH_BYTES {
            if batches.send(Batch { docs: std::mem::take(&mut buffer) }).is_err() {
                return;
            }
            buffer.reserve(batch_size);
            bytes = 0;
        }
    }
    if !buffer.is_empty() && !cancel.is_cancelled() {
        let _ = batches.send(Batch { docs: buffer });
    }
}

/// Cheap serialized-size estimate; close enough for the byte ceiling
/// without encoding every document twice.
fn approx_size(doc: &Document) -> usize {
    doc.iter().map(|(key, value)| key.len() + 2 + value_size(value)).sum::<usize>() + 5
}

fn value_size(value: &Bson) -> usize {
    match value {
        Bson::Double(_) | Bson::Int64(_) | Bson::DateTime(_) | Bson::Timestamp(_) => 8,
        Bson::String(s) | Bson::Symbol(s) => s.len() + 5,
        Bson::Array(items) => items.iter().map(|v| value_size(v) + 4).sum::<usize>() + 5,
        Bson::Document(doc) => approx_size(doc),
        Bson::Boolean(_) => 1,
        Bson::Int32(_) => 4,
        Bson::Binary(b) => b.bytes.len() + 5,
        Bson::ObjectId(_) => 12,
        Bson::Decimal128(_) => 16,
        Bson::RegularExpression(r) => r.pattern.len() + r.options.len() + 2,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use crossbeam_channel::unbounded;

    fn run(docs: Vec<Document>, batch_size: usize) -> Vec<Batch> {
        let (doc_tx, doc_rx) = unbounded();
        let (batch_tx, batch_rx) = unbounded();
        for doc in docs {
            doc_tx.send(doc).unwrap();
        }
        drop(doc_tx);
        run_batcher(&doc_rx, &batch_tx, batch_size, &Cancellation::new());
        drop(batch_tx);
        batch_rx.into_iter().collect()
    }

    #[test]
    fn splits_on_document_count() {
        let docs: Vec<Document> = (0..25).map(|i| doc! { "_id": i }).collect();
        let batches = run(docs, 10);
        let sizes: Vec<usize> = batches.iter().map(|b| b.docs.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn preserves_arrival_order() {
        let docs: Vec<Document> = (0..7).map(|i| doc! { "_id": i }).collect();
        let batches = run(docs, 3);
        let flattened: Vec<i32> =
            batches.iter().flat_map(|b| &b.docs).map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(flattened, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn splits_on_byte_budget() {
        let big = "x".repeat(6 * 1024 * 1024);
        let docs: Vec<Document> = (0..4).map(|_| doc! { "payload": big.clone() }).collect();
        let batches = run(docs, 1000);
        assert!(batches.len() >= 2, "byte ceiling should split the batch");
    }
}
