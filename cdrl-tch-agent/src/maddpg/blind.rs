use super::BlindConfig;
use anyhow::Result;
use cdrl_core::error::CoreError;
use std::convert::TryFrom;
use tch::Tensor;

fn layout_error(msg: String) -> anyhow::Error {
    CoreError::NeighborLayout(msg).into()
}

/// Crops the view of every neighbor out of a spatial state.
///
/// `state` is `[batch, C, H, W]` and `neighbor_action` is `[batch, slots]`. The state
/// is zero-padded by `(W - 1) / 2` cells; neighbor positions are the non-zero cells of
/// channel `C - observation_dims` in the last batch row, in row-major order, and are
/// assigned to the slots of the last row of `neighbor_action` that are not `-1`.
/// Each assigned slot gets a `[batch, C, W, W]` window, the others `None`.
pub fn neighbor_windows(
    state: &Tensor,
    neighbor_action: &Tensor,
    config: &BlindConfig,
) -> Result<Vec<Option<Tensor>>> {
    let size = state.size();
    if size.len() != 4 || size[0] == 0 {
        return Err(CoreError::ShapeMismatch(format!(
            "spatial state must be [batch, C, H, W], got {:?}",
            size
        ))
        .into());
    }
    let (batch_size, channels, width) = (size[0], size[1], size[3]);
    let marker_channel = channels - config.observation_dims;
    if marker_channel < 0 || marker_channel >= channels {
        return Err(layout_error(format!(
            "no marker channel with {} observation dims in {} channels",
            config.observation_dims, channels
        )));
    }
    let action_size = neighbor_action.size();
    if action_size.len() != 2 || action_size[0] != batch_size {
        return Err(CoreError::ShapeMismatch(format!(
            "neighbor actions must be [{}, slots], got {:?}",
            batch_size, action_size
        ))
        .into());
    }

    let half = (width - 1) / 2;
    let span = 2 * half + 1;
    let pad_width = config.pad_width();
    let padded = state.constant_pad_nd([half, half, half, half].as_slice());
    let (padded_h, padded_w) = (size[2] + 2 * half, width + 2 * half);

    let marker = padded.get(batch_size - 1).get(marker_channel);
    let positions = Vec::<i64>::try_from(&marker.ne(0.0).nonzero().view([-1]))?;
    let last_actions = Vec::<i64>::try_from(
        &neighbor_action
            .get(batch_size - 1)
            .to_kind(tch::Kind::Int64)
            .view([-1]),
    )?;

    let crop_start =
        |pos: i64| (pos as f64 / config.square_step).floor() as i64 + pad_width - half;

    let mut k = 0;
    let mut windows = Vec::with_capacity(last_actions.len());
    for (slot, &action) in last_actions.iter().enumerate() {
        if action == -1 {
            windows.push(None);
            continue;
        }
        if 2 * k + 1 >= positions.len() {
            return Err(layout_error(format!(
                "slot {} has no neighbor marker, {} markers found",
                slot,
                positions.len() / 2
            )));
        }
        let (row, col) = (crop_start(positions[2 * k]), crop_start(positions[2 * k + 1]));
        if row < 0 || col < 0 || row + span > padded_h || col + span > padded_w {
            return Err(layout_error(format!(
                "window of slot {} at ({}, {}) exceeds the padded map {}x{}",
                slot, row, col, padded_h, padded_w
            )));
        }
        windows.push(Some(padded.narrow(2, row, span).narrow(3, col, span)));
        k += 1;
    }

    Ok(windows)
}
