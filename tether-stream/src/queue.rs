//! Outbound message queue used while the connection is not open.

use crate::config::OverflowPolicy;
use crate::message::Message;
use std::collections::VecDeque;

/// FIFO of messages waiting for the connection to open.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<Message>,
    max_size: Option<usize>,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    /// Create a queue, optionally capped at `max_size` messages.
    pub fn new(max_size: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
            policy,
        }
    }

    /// Append a message, returning the message dropped to make room, if any.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        match self.max_size {
            Some(max) if self.items.len() >= max => match self.policy {
                OverflowPolicy::DropOldest => {
                    let dropped = self.items.pop_front();
                    self.items.push_back(message);
                    dropped
                }
                OverflowPolicy::DropNewest => Some(message),
            },
            _ => {
                self.items.push_back(message);
                None
            }
        }
    }

    /// Put messages that were never written back at the head of the queue,
    /// keeping their order. Returns whatever the cap forces out.
    pub fn requeue_front(&mut self, messages: Vec<Message>) -> Vec<Message> {
        for message in messages.into_iter().rev() {
            self.items.push_front(message);
        }

        let mut dropped = Vec::new();
        if let Some(max) = self.max_size {
            while self.items.len() > max {
                let removed = match self.policy {
                    OverflowPolicy::DropOldest => self.items.pop_front(),
                    OverflowPolicy::DropNewest => self.items.pop_back(),
                };
                dropped.extend(removed);
            }
        }
        dropped
    }

    /// Take every queued message in submission order.
    pub fn drain(&mut self) -> impl Iterator<Item = Message> + '_ {
        self.items.drain(..)
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every queued message.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
