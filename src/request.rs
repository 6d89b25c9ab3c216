//! Request/reply on top of plain message passing.
//!
//! [`request_future`] wraps a payload into a [`Request`] carrying a reply
//! slot, delivers it, and hands back a [`ReplyFuture`]. The receiving
//! agent subscribes to `Request<M, R>` like to any other message and calls
//! [`Request::reply`]; the requester blocks on the future, with or without
//! a timeout. Dropping the request without replying fails the future with
//! [`RuntimeError::NoReply`] instead of hanging it.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::{Condvar, Mutex};

// Layer 3: Internal module imports
use crate::error::{Result, RuntimeError};
use crate::mailbox::MboxRef;
use crate::message::Message;
use crate::send::send;

struct ReplyState<R> {
    value: Option<R>,
    abandoned: bool,
}

struct ReplyShared<R> {
    state: Mutex<ReplyState<R>>,
    signal: Condvar,
}

/// A message carrying its own reply slot.
///
/// Subscribe to it like to any message:
///
/// ```rust,ignore
/// ctx.so_subscribe(&mbox)
///     .event(|this: &mut Self, req: &Request<Sum, i64>| {
///         let total = req.payload().a + req.payload().b;
///         req.reply(total);
///     })?;
/// ```
pub struct Request<M, R> {
    payload: M,
    shared: Arc<ReplyShared<R>>,
    replied: Mutex<bool>,
}

impl<M, R> Request<M, R> {
    /// The wrapped payload.
    pub fn payload(&self) -> &M {
        &self.payload
    }

    /// Answer the request. Only the first reply counts; later calls
    /// return `false`.
    pub fn reply(&self, value: R) -> bool {
        let mut replied = self.replied.lock();
        if *replied {
            return false;
        }
        *replied = true;
        let mut state = self.shared.state.lock();
        state.value = Some(value);
        drop(state);
        self.shared.signal.notify_all();
        true
    }
}

impl<M, R> Drop for Request<M, R> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if state.value.is_none() {
            state.abandoned = true;
            drop(state);
            self.shared.signal.notify_all();
        }
    }
}

impl<M: fmt::Debug, R> fmt::Debug for Request<M, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("payload", &self.payload)
            .finish()
    }
}

/// The requester's side of a pending [`Request`].
pub struct ReplyFuture<R> {
    shared: Arc<ReplyShared<R>>,
}

impl<R> ReplyFuture<R> {
    /// Block until the reply arrives.
    ///
    /// `timeout = None` waits indefinitely. Fails with
    /// [`RuntimeError::NoReply`] when the request was dropped unanswered
    /// and [`RuntimeError::Timeout`] when the wait runs out.
    pub fn wait(self, timeout: Option<Duration>) -> Result<R> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Ok(value);
            }
            if state.abandoned {
                return Err(RuntimeError::NoReply);
            }
            match timeout {
                None => self.shared.signal.wait(&mut state),
                Some(timeout) => {
                    if self.shared.signal.wait_for(&mut state, timeout).timed_out() {
                        if let Some(value) = state.value.take() {
                            return Ok(value);
                        }
                        if state.abandoned {
                            return Err(RuntimeError::NoReply);
                        }
                        return Err(RuntimeError::Timeout { timeout });
                    }
                }
            }
        }
    }

    /// Non-blocking probe; `None` while the reply is pending.
    pub fn try_take(&self) -> Option<R> {
        self.shared.state.lock().value.take()
    }
}

/// Deliver `Request<M, R>` to `target` and return the reply future.
pub fn request_future<R, M>(target: &MboxRef, payload: M) -> Result<ReplyFuture<R>>
where
    M: Message,
    R: Send + 'static,
{
    let shared = Arc::new(ReplyShared {
        state: Mutex::new(ReplyState {
            value: None,
            abandoned: false,
        }),
        signal: Condvar::new(),
    });
    let request: Request<M, R> = Request {
        payload,
        shared: Arc::clone(&shared),
        replied: Mutex::new(false),
    };
    send(target, request)?;
    Ok(ReplyFuture { shared })
}

/// Deliver `Request<M, R>` and block for the reply.
pub fn request_value<R, M>(target: &MboxRef, wait: Option<Duration>, payload: M) -> Result<R>
where
    M: Message,
    R: Send + 'static,
{
    request_future(target, payload)?.wait(wait)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_resolves_future() {
        let shared = Arc::new(ReplyShared {
            state: Mutex::new(ReplyState {
                value: None,
                abandoned: false,
            }),
            signal: Condvar::new(),
        });
        let request: Request<u32, u32> = Request {
            payload: 21,
            shared: Arc::clone(&shared),
            replied: Mutex::new(false),
        };
        let future = ReplyFuture {
            shared: Arc::clone(&shared),
        };

        assert!(request.reply(*request.payload() * 2));
        assert!(!request.reply(0));
        assert_eq!(future.wait(None).unwrap(), 42);
    }

    #[test]
    fn test_dropped_request_fails_future() {
        let shared = Arc::new(ReplyShared {
            state: Mutex::new(ReplyState {
                value: None,
                abandoned: false,
            }),
            signal: Condvar::new(),
        });
        let request: Request<u32, u32> = Request {
            payload: 1,
            shared: Arc::clone(&shared),
            replied: Mutex::new(false),
        };
        let future = ReplyFuture { shared };

        drop(request);
        assert!(matches!(future.wait(None), Err(RuntimeError::NoReply)));
    }

    #[test]
    fn test_wait_timeout() {
        let shared: Arc<ReplyShared<u32>> = Arc::new(ReplyShared {
            state: Mutex::new(ReplyState {
                value: None,
                abandoned: false,
            }),
            signal: Condvar::new(),
        });
        // Keep a request alive so the future is genuinely pending.
        let _request: Request<u32, u32> = Request {
            payload: 1,
            shared: Arc::clone(&shared),
            replied: Mutex::new(false),
        };
        let future = ReplyFuture { shared };
        let result = future.wait(Some(Duration::from_millis(10)));
        assert!(matches!(result, Err(RuntimeError::Timeout { .. })));
    }
}
