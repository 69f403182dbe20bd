//! Answering action requests of worker threads on the thread owning the networks.
//!
//! Workers send observations as plain arrays over [`ServerChannel`]s, so tensors
//! and the device context never leave the serving thread.
use crate::util::to_i64_shape;
use anyhow::Result;
use cdrl_core::{error::CoreError, Request, ServerChannel};
use log::{info, trace, warn};
use tch::{no_grad, Tensor};

/// Agents that can pick an action for a served observation.
pub trait ActionServer {
    /// Number of actions, the expected length of availability masks.
    fn action_size(&self) -> usize;

    /// Picks an action for a single observation given the availability of each action.
    fn serve_action(&mut self, obs: &Tensor, avail: &Tensor) -> Result<i64>;
}

/// Outcome of handling one message of a channel.
enum Handled {
    Answered,
    Retired,
}

/// Validates a request and asks `server` for an action.
fn answer<S: ActionServer>(
    server: &mut S,
    obs: &[f32],
    shape: &[usize],
    avail: &[f32],
) -> Result<i64> {
    if obs.len() != shape.iter().product::<usize>() {
        return Err(CoreError::ShapeMismatch(format!(
            "observation of {} values with shape {:?}",
            obs.len(),
            shape
        ))
        .into());
    }
    if avail.len() != server.action_size() {
        return Err(CoreError::ShapeMismatch(format!(
            "{} availability flags for {} actions",
            avail.len(),
            server.action_size()
        ))
        .into());
    }
    let obs = Tensor::from_slice(obs).f_view(to_i64_shape(shape).as_slice())?;
    let avail = Tensor::from_slice(avail);
    no_grad(|| server.serve_action(&obs, &avail))
}

/// Handles the next message of a channel.
///
/// A request that cannot be answered retires its channel only.
fn handle<S, C>(server: &mut S, channel: &mut C, k: usize) -> Result<Handled>
where
    S: ActionServer,
    C: ServerChannel,
{
    match channel.recv() {
        Some(Request::Act { obs, shape, avail }) => {
            let action = match answer(server, &obs, &shape, &avail) {
                Ok(action) => action,
                Err(e) => {
                    warn!("Channel {}: bad request, retired: {}", k, e);
                    channel.close();
                    return Ok(Handled::Retired);
                }
            };
            trace!("Channel {}: action {}", k, action);
            if let Err(e) = channel.send(action) {
                warn!("Channel {} is unreadable: {}", k, e);
                channel.close();
                return Ok(Handled::Retired);
            }
            Ok(Handled::Answered)
        }
        Some(Request::Done) | None => {
            channel.close();
            info!("Channel {} retired", k);
            Ok(Handled::Retired)
        }
    }
}

/// Serves all channels until every one of them is retired.
///
/// Blocks on each active channel in turn.
pub fn lookup_server<S, C>(server: &mut S, channels: &mut [C]) -> Result<()>
where
    S: ActionServer,
    C: ServerChannel,
{
    let mut active = channels.iter().map(|c| !c.is_closed()).collect::<Vec<_>>();

    while active.iter().any(|&a| a) {
        for (k, channel) in channels.iter_mut().enumerate() {
            if !active[k] {
                continue;
            }
            if let Handled::Retired = handle(server, channel, k)? {
                active[k] = false;
            }
        }
    }
    info!("All {} channels retired", channels.len());

    Ok(())
}

/// Answers at most one pending request of every channel without blocking.
///
/// Returns `true` if any channel is still active.
pub fn lookup_server_loop<S, C>(server: &mut S, channels: &mut [C]) -> Result<bool>
where
    S: ActionServer,
    C: ServerChannel,
{
    let mut any_active = false;

    for (k, channel) in channels.iter_mut().enumerate() {
        if channel.is_closed() {
            continue;
        }
        if channel.poll() {
            if let Handled::Retired = handle(server, channel, k)? {
                continue;
            }
        }
        any_active = true;
    }

    Ok(any_active)
}
