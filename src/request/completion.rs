//! Resolve-at-most-once completion handle.
//!
//! A `CompletionHandle` is the resolving side of a suspended caller; the paired
//! `Completion` is the future the caller awaits. Every resolution attempt takes
//! the slot lock and checks the phase first, so deliveries after completion or
//! cancellation are inert.

use crate::error::{WeaveError, WeaveResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Lifecycle phase shared by completion handles and callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlePhase {
    /// Awaiting resolution
    Active = 0,
    /// Resolved with a value
    Completed = 1,
    /// Cancelled before resolution
    Cancelled = 2,
}

impl HandlePhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl From<u8> for HandlePhase {
    fn from(value: u8) -> Self {
        match value {
            0 => HandlePhase::Active,
            1 => HandlePhase::Completed,
            _ => HandlePhase::Cancelled,
        }
    }
}

impl fmt::Display for HandlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Resolving side of a suspension point
pub struct CompletionHandle<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
    phase: Arc<AtomicU8>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            phase: Arc::clone(&self.phase),
        }
    }
}

impl<T> fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("phase", &self.phase())
            .finish()
    }
}

/// Create a linked handle/future pair
pub fn completion<T>() -> (CompletionHandle<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    let phase = Arc::new(AtomicU8::new(HandlePhase::Active as u8));
    (
        CompletionHandle {
            sender: Arc::new(Mutex::new(Some(tx))),
            phase: Arc::clone(&phase),
        },
        Completion {
            receiver: rx,
            phase,
        },
    )
}

impl<T> CompletionHandle<T> {
    /// Resolve with `value`; returns false if already resolved or cancelled
    pub fn resolve(&self, value: T) -> bool {
        let mut sender = self.sender.lock();
        if self.phase() != HandlePhase::Active {
            return false;
        }
        let Some(tx) = sender.take() else {
            return false;
        };
        self.phase
            .store(HandlePhase::Completed as u8, Ordering::Release);
        drop(sender);
        // The waiter may already be gone; the handle still counts as completed
        let _ = tx.send(value);
        true
    }

    /// Cancel the pending resolution; the paired future yields `Cancelled`
    pub fn cancel(&self) -> bool {
        let mut sender = self.sender.lock();
        if self.phase() != HandlePhase::Active {
            return false;
        }
        self.phase
            .store(HandlePhase::Cancelled as u8, Ordering::Release);
        sender.take();
        true
    }

    pub fn phase(&self) -> HandlePhase {
        HandlePhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.phase() == HandlePhase::Active
    }
}

/// Awaiting side of a suspension point
#[derive(Debug)]
pub struct Completion<T> {
    receiver: oneshot::Receiver<T>,
    phase: Arc<AtomicU8>,
}

impl<T> Completion<T> {
    pub fn phase(&self) -> HandlePhase {
        HandlePhase::from(self.phase.load(Ordering::Acquire))
    }
}

impl<T> Future for Completion<T> {
    type Output = WeaveResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Ok(value)),
            Poll::Ready(Err(_)) => match self.phase() {
                HandlePhase::Cancelled => Poll::Ready(Err(WeaveError::Cancelled)),
                _ => Poll::Ready(Err(WeaveError::Abandoned)),
            },
            Poll::Pending => Poll::Pending,
        }
    }
}
