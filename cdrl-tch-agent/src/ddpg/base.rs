//! DDPG agent implemented with tch-rs.
use super::{DdpgConfig, ACTOR_L2, MAX_GRAD_NORM};
use crate::{
    agent::{Agent, TaskMode},
    distributional::{AverageReward, Support},
    memory::Memory,
    model::{ActorCritic, ModelBase},
    selector::{boltzmann, greedy, to_one_hot, ActionSelection},
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

/// DDPG agent whose critic returns a distribution over the support.
///
/// Actions are discrete: the actor scores every action, the critic takes a one-hot
/// action during value learning and the raw actor output for the policy objective.
pub struct Ddpg<P: ActorCritic> {
    pub(in crate::ddpg) index: usize,
    pub(in crate::ddpg) nets: TwinNet<P>,
    pub(in crate::ddpg) support: Support,
    pub(in crate::ddpg) action_selection: ActionSelection,
    pub(in crate::ddpg) n_actions: usize,
    pub(in crate::ddpg) batch_size: usize,
    pub(in crate::ddpg) discount_n: f64,
    pub(in crate::ddpg) average_reward: AverageReward,
    pub(in crate::ddpg) device: Device,
    pub(in crate::ddpg) n_opts: usize,
}

impl<P> Ddpg<P>
where
    P: ActorCritic,
    P::Config: DeserializeOwned + Serialize,
{
    /// Constructs the agent with `index` for the action space of `env`.
    pub fn build<E: Env>(mut config: DdpgConfig<P::Config>, env: &E, index: usize) -> Result<Self> {
        let device = config.tch_device();
        let nets = TwinNet::build(
            config.take_model_config()?,
            config.opt_config.clone(),
            device,
            config.pretrained_path(index),
        )?;
        let support = Support::new(config.v_min, config.v_max, config.atoms, device)?;
        info!(
            "Construct DDPG agent {} with {} actions and {} atoms",
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

    /// Actor output for a single state, `[1, n_actions]`.
    fn values(&self, state: &Tensor) -> Tensor {
        no_grad(|| {
            self.nets
                .online()
                .net()
                .actor(&state.to(self.device).unsqueeze(0))
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
        selection.e_greedy(&self.values(state), &avail.to(self.device), epsilon)
    }

    /// Action sampled from the softmax of the actor output over available actions.
    pub fn act_boltzmann(&self, state: &Tensor, avail: &Tensor) -> Result<i64> {
        let action = boltzmann(&self.values(state), &avail.to(self.device).view([1, -1]))?;
        Ok(action.int64_value(&[0]))
    }

    /// Largest actor output for a single state.
    pub fn evaluate_q(&self, state: &Tensor) -> f64 {
        self.values(state).max().double_value(&[])
    }

    /// Current average-reward estimate.
    pub fn average_reward(&self) -> f64 {
        self.average_reward.value()
    }

    /// Performs a learning step on a batch sampled from `memory`.
    pub fn learn<M: Memory>(&mut self, memory: &mut M, mode: TaskMode) -> Result<Record> {
        if mode == TaskMode::Episodic {
            self.average_reward.reset();
        }
        let batch = memory
            .sample(self.batch_size, self.average_reward.value())?
            .to_device(self.device);
        let n_actions = self.n_actions as i64;
        let act_one_hot = to_one_hot(&batch.actions, n_actions)?;

        let log_ps_a = self
            .nets
            .online()
            .net()
            .critic(&batch.states, &act_one_hot, true);

        self.nets.target_mut().net_mut().reset_noise();
        let (m, target_value, online_value) = no_grad(|| -> Result<_> {
            let online = self.nets.online().net();
            let next_actions = self
                .action_selection
                .select(&online.actor(&batch.next_states), &batch.avails)?;
            let pns_a = self.nets.target().net().critic(
                &batch.next_states,
                &to_one_hot(&next_actions, n_actions)?,
                false,
            );
            let m = self.support.project(
                &batch.returns,
                &batch.nonterminals,
                self.discount_n,
                &pns_a,
            )?;
            let ps_a = online.critic(&batch.states, &act_one_hot, false);

            Ok((
                m,
                self.support.expectation(&pns_a),
                self.support.expectation(&ps_a),
            ))
        })?;
        let avg_reward = self
            .average_reward
            .update_with(&batch.returns, &target_value, &online_value);

        let value_loss = -(m * log_ps_a).sum_dim_intlist(Some([-1].as_slice()), false, Kind::Float);
        let loss_critic = (&batch.weights * &value_loss).mean(Kind::Float);

        let net = self.nets.online().net();
        let pi = net.actor(&batch.states);
        let q = self
            .support
            .expectation(&net.critic(&batch.states, &pi, false));
        let loss_actor = -q.mean(Kind::Float) + ACTOR_L2 * pi.square().mean(Kind::Float);

        let objective = &loss_critic + &loss_actor;
        self.nets
            .online_mut()
            .backward_step_clip_norm(&objective, MAX_GRAD_NORM);

        let priorities = Vec::<f32>::try_from(&value_loss.detach().to(Device::Cpu))?;
        memory.update_priorities(&batch.ixs, &priorities)?;
        self.n_opts += 1;

        let loss_critic = loss_critic.double_value(&[]) as f32;
        let loss_actor = loss_actor.double_value(&[]) as f32;
        trace!(
            "DDPG {}: step {}, loss_critic = {}, loss_actor = {}",
            self.index,
            self.n_opts,
            loss_critic,
            loss_actor
        );

        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("loss_actor", RecordValue::Scalar(loss_actor)),
            ("average_reward", RecordValue::Scalar(avg_reward as f32)),
        ]))
    }
}

impl<P> Agent for Ddpg<P>
where
    P: ActorCritic,
{
    type Net = P;

    fn index(&self) -> usize {
        self.index
    }

    fn nets(&self) -> &TwinNet<P> {
        &self.nets
    }

    fn nets_mut(&mut self) -> &mut TwinNet<P> {
        &mut self.nets
    }
}

impl<P> ActionServer for Ddpg<P>
where
    P: ActorCritic,
    P::Config: DeserializeOwned + Serialize,
{
    fn action_size(&self) -> usize {
        self.n_actions
    }

    fn serve_action(&mut self, obs: &Tensor, avail: &Tensor) -> Result<i64> {
        self.act_boltzmann(obs, avail)
    }
}
