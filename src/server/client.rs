use crate::server::protocol::ServerMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Bounded outbound queue for one client. A slow consumer loses its oldest
/// pending render first (a newer frame supersedes an older one) and is
/// never allowed to block the producer.
pub struct OutboundQueue {
    depth: usize,
    queue: Mutex<VecDeque<ServerMessage>>,
    notify: Notify,
    closed: AtomicBool,
}

impl OutboundQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue without blocking. On overflow the oldest pending render is
    /// dropped; one-shot messages (menus, control) are kept.
    pub fn push(&self, message: ServerMessage) {
        {
            let mut queue = self.queue.lock().expect("queue poisoned");
            if queue.len() >= self.depth {
                if let Some(pos) = queue.iter().position(|m| m.is_render()) {
                    queue.remove(pos);
                } else {
                    queue.pop_front();
                }
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<ServerMessage> {
        self.queue.lock().expect("queue poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until a message is available or the queue is closed.
    pub async fn ready(&self) {
        loop {
            if self.is_closed() || !self.is_empty() {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Resolves once `close` has been called. Used by the reader task so a
    /// force-closed client stops consuming input immediately.
    pub async fn closed(&self) {
        while !self.is_closed() {
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::render::Frame;

    fn render(seq: u64) -> ServerMessage {
        ServerMessage::Render(Frame {
            seq,
            content: String::new(),
            pinned_content: String::new(),
            width: 25,
            height: 24,
            total_lines: 0,
            pinned_height: 0,
            regions: vec![],
            sidebar_bg: None,
        })
    }

    fn seq_of(message: &ServerMessage) -> u64 {
        match message {
            ServerMessage::Render(f) => f.seq,
            _ => panic!("not a render"),
        }
    }

    #[test]
    fn test_overflow_drops_oldest_render() {
        let queue = OutboundQueue::new(3);
        for seq in 1..=5 {
            queue.push(render(seq));
        }
        assert_eq!(queue.len(), 3);
        // 1 and 2 were dropped; 3..=5 remain in order.
        assert_eq!(seq_of(&queue.pop().unwrap()), 3);
        assert_eq!(seq_of(&queue.pop().unwrap()), 4);
        assert_eq!(seq_of(&queue.pop().unwrap()), 5);
    }

    #[test]
    fn test_overflow_spares_control_messages() {
        let queue = OutboundQueue::new(2);
        queue.push(ServerMessage::AttachedPane {
            pane_id: "%1".into(),
        });
        queue.push(render(1));
        queue.push(render(2));
        // The render, not the control message, was evicted.
        assert!(matches!(
            queue.pop().unwrap(),
            ServerMessage::AttachedPane { .. }
        ));
        assert_eq!(seq_of(&queue.pop().unwrap()), 2);
    }

    #[test]
    fn test_frames_never_reorder() {
        let queue = OutboundQueue::new(8);
        for seq in 1..=6 {
            queue.push(render(seq));
        }
        let mut last = 0;
        while let Some(msg) = queue.pop() {
            let seq = seq_of(&msg);
            assert!(seq > last);
            last = seq;
        }
    }

    #[tokio::test]
    async fn test_ready_wakes_on_push_and_close() {
        let queue = std::sync::Arc::new(OutboundQueue::new(4));

        let q = queue.clone();
        let waiter = tokio::spawn(async move {
            q.ready().await;
            q.pop()
        });
        queue.push(render(1));
        let got = waiter.await.unwrap();
        assert!(got.is_some());

        let q = queue.clone();
        let waiter = tokio::spawn(async move {
            q.ready().await;
            q.is_closed()
        });
        queue.close();
        assert!(waiter.await.unwrap());
    }
}
