//! Rainbow agent implemented with tch-rs.
use super::RainbowConfig;
use crate::{
    agent::{Agent, TaskMode},
    distributional::{AverageReward, Support},
    memory::Memory,
    model::{CategoricalQ, ModelBase},
    selector::{boltzmann, greedy, ActionSelection},
    serve::ActionServer,
    twin::TwinNet,
};
use anyhow::Result;
use cdrl_core::{
    record::{Record, RecordValue},
    Env,
};
use std::convert::TryFrom;
use log::{info, trace};
use serde::{de::DeserializeOwned, Serialize};
use tch::{no_grad, Device, Kind, Tensor};

const MAX_GRAD_NORM: f64 = 10.0;

/// Distributions at the given actions, `[batch, n_actions, atoms] -> [batch, atoms]`.
fn gather_action(dist: &Tensor, actions: &Tensor) -> Tensor {
    let size = dist.size();
    let index = actions
        .to_kind(Kind::Int64)
        .view([-1, 1, 1])
        .expand([size[0], 1, size[2]], false);
    dist.gather(1, &index, false).squeeze_dim(1)
}

/// Rainbow agent implemented with tch-rs.
pub struct Rainbow<Q: CategoricalQ> {
    pub(in crate::rainbow) index: usize,
    pub(in crate::rainbow) nets: TwinNet<Q>,
    pub(in crate::rainbow) support: Support,
    pub(in crate::rainbow) action_selection: ActionSelection,
    pub(in crate::rainbow) n_actions: usize,
    pub(in crate::rainbow) batch_size: usize,
    pub(in crate::rainbow) discount_n: f64,
    pub(in crate::rainbow) average_reward: AverageReward,
    pub(in crate::rainbow) device: Device,
    pub(in crate::rainbow) n_opts: usize,
}

impl<Q> Rainbow<Q>
where
    Q: CategoricalQ,
    Q::Config: DeserializeOwned + Serialize,
{
    /// Constructs the agent with `index` for the action space of `env`.
    ///
    /// With `model_dir` set in the config, the online network is initialized from
    /// `model<index>.pth` in that directory.
    pub fn build<E: Env>(mut config: RainbowConfig<Q::Config>, env: &E, index: usize) -> Result<Self> {
        let device = config.tch_device();
        let nets = TwinNet::build(
            config.take_model_config()?,
            config.opt_config.clone(),
            device,
            config.pretrained_path(index),
        )?;
        let support = Support::new(config.v_min, config.v_max, config.atoms, device)?;
        info!(
            "Construct Rainbow agent {} with {} actions and {} atoms",
            index,
            env.action_size(),
            config.atoms
        );

        Ok(Self {
            index,
            nets,
            support,
            action_selection: config.action_selection,
            n_actions: env.action_size(),
            batch_size: config.batch_size,
            discount_n: config.discount_n(),
            average_reward: AverageReward::new(config.reward_update_rate),
            device,
            n_opts: 0,
        })
    }

    /// Expected values of all actions for a single state, `[1, n_actions]`.
    fn values(&self, state: &Tensor) -> Tensor {
        no_grad(|| {
            let ps = self
                .nets
                .online()
                .net()
                .forward(&state.to(self.device).unsqueeze(0), false);
            self.support.expectation(&ps)
        })
    }

    /// Greedy action for a single state, restricted to `avail` if given.
    pub fn act(&self, state: &Tensor, avail: Option<&Tensor>) -> i64 {
        let values = self.values(state);
        match avail {
            Some(avail) => greedy(&values, &avail.to(self.device).view([1, -1])).int64_value(&[0]),
            None => values.argmax(-1, false).int64_value(&[0]),
        }
    }

    /// Action for a single state with exploration rate `epsilon` under `selection`.
    pub fn act_e_greedy(
        &self,
        state: &Tensor,
        avail: &Tensor,
        epsilon: f64,
        selection: ActionSelection,
    ) -> Result<i64> {
        let values = self.values(state);
        selection.e_greedy(&values, &avail.to(self.device), epsilon)
    }

    /// Action sampled from the softmax of expected values over available actions.
    pub fn act_boltzmann(&self, state: &Tensor, avail: &Tensor) -> Result<i64> {
        let values = self.values(state);
        let action = boltzmann(&values, &avail.to(self.device).view([1, -1]))?;
        Ok(action.int64_value(&[0]))
    }

    /// Largest expected value over actions for a single state.
    pub fn evaluate_q(&self, state: &Tensor) -> f64 {
        self.values(state).max().double_value(&[])
    }

    /// Current average-reward estimate.
    pub fn average_reward(&self) -> f64 {
        self.average_reward.value()
    }

    /// Number of actions.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Performs a learning step on a batch sampled from `memory`.
    pub fn learn<M: Memory>(&mut self, memory: &mut M, mode: TaskMode) -> Result<Record> {
        if mode == TaskMode::Episodic {
            self.average_reward.reset();
        }
        let batch = memory
            .sample(self.batch_size, self.average_reward.value())?
            .to_device(self.device);

        let log_ps_a = gather_action(
            &self.nets.online().net().forward(&batch.states, true),
            &batch.actions,
        );

        self.nets.target_mut().net_mut().reset_noise();
        let (m, target_value, online_value) = no_grad(|| -> Result<_> {
            let online = self.nets.online().net();
            let pns = online.forward(&batch.next_states, false);
            let next_actions = self
                .action_selection
                .select(&self.support.expectation(&pns), &batch.avails)?;
            let pns_a = gather_action(
                &self.nets.target().net().forward(&batch.next_states, false),
                &next_actions,
            );
            let m = self.support.project(
                &batch.returns,
                &batch.nonterminals,
                self.discount_n,
                &pns_a,
            )?;
            let ps_a = gather_action(&online.forward(&batch.states, false), &batch.actions);

            Ok((
                m,
                self.support.expectation(&pns_a),
                self.support.expectation(&ps_a),
            ))
        })?;
        let avg_reward = self
            .average_reward
            .update_with(&batch.returns, &target_value, &online_value);

        let loss = -(m * log_ps_a).sum_dim_intlist(Some([-1].as_slice()), false, Kind::Float);
        let objective = (&batch.weights * &loss).mean(Kind::Float);
        self.nets
            .online_mut()
            .backward_step_clip_norm(&objective, MAX_GRAD_NORM);

        let priorities = Vec::<f32>::try_from(&loss.detach().to(Device::Cpu))?;
        memory.update_priorities(&batch.ixs, &priorities)?;
        self.n_opts += 1;

        let loss_critic = objective.double_value(&[]) as f32;
        trace!(
            "Rainbow {}: step {}, loss = {}, average reward = {}",
            self.index,
            self.n_opts,
            loss_critic,
            avg_reward
        );

        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("average_reward", RecordValue::Scalar(avg_reward as f32)),
        ]))
    }
}

impl<Q> Agent for Rainbow<Q>
where
    Q: CategoricalQ,
{
    type Net = Q;

    fn index(&self) -> usize {
        self.index
    }

    fn nets(&self) -> &TwinNet<Q> {
        &self.nets
    }

    fn nets_mut(&mut self) -> &mut TwinNet<Q> {
        &mut self.nets
    }
}

impl<Q> ActionServer for Rainbow<Q>
where
    Q: CategoricalQ,
    Q::Config: DeserializeOwned + Serialize,
{
    fn action_size(&self) -> usize {
        self.n_actions
    }

    fn serve_action(&mut self, obs: &Tensor, avail: &Tensor) -> Result<i64> {
        self.act_boltzmann(obs, avail)
    }
}
