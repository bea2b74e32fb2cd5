//! Tests for timeouts, blocking waits and signal wakeups

#[cfg(test)]
mod tests {
    use crate::queue::api::{PriorityQueue, StorageMessage};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_zero_timeout_on_empty_queue_returns_immediately() {
        let queue = PriorityQueue::new();

        let start = Instant::now();
        let result = queue.get_next(Some(Duration::ZERO));

        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_timeout_elapses_on_empty_queue() {
        let queue = PriorityQueue::new();

        let start = Instant::now();
        let result = queue.get_next(Some(Duration::from_millis(30)));

        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_signal_wakes_indefinite_waiter() {
        let queue = Arc::new(PriorityQueue::new());
        let (done_tx, done_rx) = mpsc::channel();

        let waiter_queue = Arc::clone(&queue);
        let waiter = thread::spawn(move || {
            let result = waiter_queue.get_next(None);
            done_tx.send(result.is_none()).unwrap();
        });

        // Keep signalling until the waiter reports back; a signal sent before
        // the waiter starts blocking would otherwise be missed
        let deadline = Instant::now() + Duration::from_secs(5);
        let returned_empty = loop {
            queue.signal();
            match done_rx.recv_timeout(Duration::from_millis(10)) {
                Ok(empty) => break empty,
                Err(_) if Instant::now() < deadline => continue,
                Err(_) => panic!("waiter did not wake up after signal"),
            }
        };

        assert!(returned_empty);
        waiter.join().unwrap();
    }

    #[test]
    fn test_enqueue_wakes_blocked_waiter() {
        let queue = Arc::new(PriorityQueue::new());

        let waiter_queue = Arc::clone(&queue);
        let waiter = thread::spawn(move || waiter_queue.get_next(Some(Duration::from_secs(5))));

        thread::sleep(Duration::from_millis(20));
        queue.enqueue(StorageMessage::command(42, Vec::new()));

        let received = waiter.join().unwrap().expect("waiter should receive the message");
        assert_eq!(received.id(), 42);
    }

    #[test]
    fn test_signal_does_not_discard_queued_messages() {
        let queue = PriorityQueue::new();
        queue.enqueue(StorageMessage::command(1, Vec::new()));

        queue.signal();

        assert_eq!(queue.get_next(None).map(|m| m.id()), Some(1));
    }

    #[test]
    fn test_unrepresentable_timeout_returns_queued_message() {
        let queue = PriorityQueue::new();
        queue.enqueue(StorageMessage::command(7, Vec::new()));

        let received = queue.get_next(Some(Duration::MAX));

        assert_eq!(received.map(|m| m.id()), Some(7));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_until_signalled() {
        let queue = Arc::new(PriorityQueue::new());
        let (done_tx, done_rx) = mpsc::channel();

        let waiter_queue = Arc::clone(&queue);
        let waiter = thread::spawn(move || {
            let result = waiter_queue.get_next(Some(Duration::MAX));
            done_tx.send(result.is_none()).unwrap();
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        let returned_empty = loop {
            queue.signal();
            match done_rx.recv_timeout(Duration::from_millis(10)) {
                Ok(empty) => break empty,
                Err(_) if Instant::now() < deadline => continue,
                Err(_) => panic!("waiter did not wake up after signal"),
            }
        };

        assert!(returned_empty);
        waiter.join().unwrap();
    }

    #[test]
    fn test_close_wakes_indefinite_waiter() {
        let queue = Arc::new(PriorityQueue::new());

        let waiter_queue = Arc::clone(&queue);
        let waiter = thread::spawn(move || waiter_queue.get_next(None));

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(waiter.join().unwrap().is_none());
    }
}
