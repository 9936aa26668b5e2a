use super::BatchResult;
use lumenlake_common::ledger::LedgerSequence;
use log::{trace, warn};
use std::{cmp::Reverse, collections::BinaryHeap};
use tokio::sync::mpsc;

struct HeapItem(Reverse<LedgerSequence>, BatchResult);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// Restores ledger order behind the parallel workers: results are held in
// a min-heap and only contiguous prefixes are released downstream. The
// bounded output channel provides the backpressure that stops workers
// from racing ahead of a slow ledger.
pub fn spawn(
    mut input: mpsc::Receiver<BatchResult>,
    start_sequence: LedgerSequence,
    capacity: usize,
) -> mpsc::Receiver<BatchResult> {
    let (sender, receiver) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let mut next = start_sequence;
        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::new();

        loop {
            // Release every contiguous result we already hold
            while heap
                .peek()
                .map(|item| item.0 .0 == next)
                .unwrap_or(false)
            {
                let HeapItem(_, result) = heap.pop().expect("peeked");
                trace!("reassembler releasing ledger {}", result.sequence);
                next = next.saturating_add(1);
                if sender.send(result).await.is_err() {
                    return;
                }
            }

            match input.recv().await {
                Some(result) => {
                    if result.sequence < next {
                        // Redelivery of something already released; the
                        // hot buffer insert is idempotent but order says
                        // we drop it here
                        warn!(
                            "reassembler dropping stale ledger {} (next is {})",
                            result.sequence, next
                        );
                        continue;
                    }
                    heap.push(HeapItem(Reverse(result.sequence), result));
                }
                None => {
                    // Producers are gone; flush whatever is contiguous
                    while heap
                        .peek()
                        .map(|item| item.0 .0 == next)
                        .unwrap_or(false)
                    {
                        let HeapItem(_, result) = heap.pop().expect("peeked");
                        next = next.saturating_add(1);
                        if sender.send(result).await.is_err() {
                            return;
                        }
                    }
                    if !heap.is_empty() {
                        warn!(
                            "reassembler exiting with {} non-contiguous results buffered",
                            heap.len()
                        );
                    }
                    return;
                }
            }
        }
    });

    receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn result(sequence: u32) -> BatchResult {
        BatchResult {
            sequence,
            close_time: 0,
            protocol: 21,
            tables: HashMap::new(),
            duration: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_releases_contiguous_prefixes_only() {
        let (sender, input) = mpsc::channel(16);
        let mut output = spawn(input, 1, 16);

        sender.send(result(3)).await.unwrap();
        sender.send(result(2)).await.unwrap();

        // Nothing can come out before 1 arrives
        assert!(
            tokio::time::timeout(Duration::from_millis(50), output.recv())
                .await
                .is_err()
        );

        sender.send(result(1)).await.unwrap();
        assert_eq!(output.recv().await.unwrap().sequence, 1);
        assert_eq!(output.recv().await.unwrap().sequence, 2);
        assert_eq!(output.recv().await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_strictly_increasing_output() {
        let (sender, input) = mpsc::channel(64);
        let mut output = spawn(input, 1, 64);

        // Scrambled arrival order
        for sequence in [4u32, 1, 3, 2, 6, 5, 8, 7] {
            sender.send(result(sequence)).await.unwrap();
        }
        drop(sender);

        let mut last = 0u32;
        while let Some(result) = output.recv().await {
            assert!(result.sequence > last, "{} !> {}", result.sequence, last);
            last = result.sequence;
        }
        assert_eq!(last, 8);
    }

    #[tokio::test]
    async fn test_stale_results_dropped() {
        let (sender, input) = mpsc::channel(16);
        let mut output = spawn(input, 5, 16);

        sender.send(result(5)).await.unwrap();
        assert_eq!(output.recv().await.unwrap().sequence, 5);

        // A stale redelivery below the release point is ignored
        sender.send(result(4)).await.unwrap();
        sender.send(result(6)).await.unwrap();
        assert_eq!(output.recv().await.unwrap().sequence, 6);
    }
}
