//! Duplex channels between an action-serving thread and its workers.
//!
//! Workers marshal observations as plain numeric arrays, so tensors and the
//! compute device stay on the thread that owns the networks. Each worker owns a
//! [`WorkerEnd`]; the serving thread owns the matching [`ServerEnd`]s and
//! answers [`Request::Act`] messages with action indices until every worker
//! has sent [`Request::Done`] or hung up.
use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::trace;

/// A message sent from a worker to the serving thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Asks for an action for a single observation.
    Act {
        /// Flattened observation.
        obs: Vec<f32>,

        /// Shape of the observation, without batch dimension.
        shape: Vec<usize>,

        /// Availability of each action, `1.0` if selectable.
        avail: Vec<f32>,
    },

    /// Terminal sentinel. The worker will not send further requests.
    Done,
}

/// The serving side of a duplex channel.
pub trait ServerChannel {
    /// Returns `true` if [`ServerChannel::recv`] will not block, i.e.,
    /// a request is pending or the worker hung up.
    fn poll(&mut self) -> bool;

    /// Receives the next request, blocking until one arrives.
    ///
    /// Returns `None` when the worker side is disconnected.
    fn recv(&mut self) -> Option<Request>;

    /// Sends an action index back to the worker.
    fn send(&mut self, action: i64) -> Result<()>;

    /// Retires the channel. Nothing is sent on a closed channel, and a worker
    /// waiting for an action is released with an error.
    fn close(&mut self);

    /// Returns `true` if the channel has been retired.
    fn is_closed(&self) -> bool;
}

/// Serving side of a channel created by [`duplex`].
pub struct ServerEnd {
    requests: Receiver<Request>,
    responses: Option<Sender<i64>>,
    pending: Option<Request>,
    disconnected: bool,
    closed: bool,
}

/// Worker side of a channel created by [`duplex`].
pub struct WorkerEnd {
    requests: Sender<Request>,
    responses: Receiver<i64>,
}

/// Creates a connected pair of channel ends.
pub fn duplex() -> (ServerEnd, WorkerEnd) {
    let (req_tx, req_rx) = unbounded();
    let (res_tx, res_rx) = unbounded();
    (
        ServerEnd {
            requests: req_rx,
            responses: Some(res_tx),
            pending: None,
            disconnected: false,
            closed: false,
        },
        WorkerEnd {
            requests: req_tx,
            responses: res_rx,
        },
    )
}

impl ServerChannel for ServerEnd {
    fn poll(&mut self) -> bool {
        if self.pending.is_some() || self.disconnected {
            return true;
        }
        match self.requests.try_recv() {
            Ok(req) => {
                self.pending = Some(req);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.disconnected = true;
                true
            }
        }
    }

    fn recv(&mut self) -> Option<Request> {
        if let Some(req) = self.pending.take() {
            return Some(req);
        }
        if self.disconnected {
            return None;
        }
        match self.requests.recv() {
            Ok(req) => Some(req),
            Err(_) => {
                self.disconnected = true;
                None
            }
        }
    }

    fn send(&mut self, action: i64) -> Result<()> {
        trace!("Send action {}", action);
        self.responses
            .as_ref()
            .ok_or_else(|| anyhow!("Channel is closed"))?
            .send(action)?;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending = None;
        self.responses = None;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl WorkerEnd {
    /// Sends an observation and waits for the action chosen by the server.
    pub fn act(&self, obs: Vec<f32>, shape: Vec<usize>, avail: Vec<f32>) -> Result<i64> {
        self.requests.send(Request::Act { obs, shape, avail })?;
        Ok(self.responses.recv()?)
    }

    /// Tells the server that this worker is finished.
    pub fn done(self) -> Result<()> {
        self.requests.send(Request::Done)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn poll_sees_pending_request_and_disconnection() {
        let (mut server, worker) = duplex();
        assert!(!server.poll());

        worker.requests.send(Request::Done).unwrap();
        assert!(server.poll());
        assert_eq!(server.recv(), Some(Request::Done));

        drop(worker);
        assert!(server.poll());
        assert_eq!(server.recv(), None);
    }

    #[test_log::test]
    fn closed_channel_drops_pending_request() {
        let (mut server, worker) = duplex();
        worker
            .requests
            .send(Request::Act {
                obs: vec![0.0],
                shape: vec![1],
                avail: vec![1.0],
            })
            .unwrap();
        assert!(server.poll());
        server.close();
        assert!(server.is_closed());
        assert!(server.pending.is_none());
    }

    #[test_log::test]
    fn closing_releases_waiting_worker() {
        let (mut server, worker) = duplex();
        server.close();
        assert!(server.send(0).is_err());
        assert!(worker.act(vec![0.0], vec![1], vec![1.0]).is_err());
    }
}
