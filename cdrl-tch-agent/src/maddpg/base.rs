//! Multi-agent DDPG agent implemented with tch-rs.
use super::{neighbor_windows, BlindConfig, MaddpgConfig, SiblingRegistry};
use crate::{
    agent::{Agent, TaskMode},
    ddpg::{ACTOR_L2, MAX_GRAD_NORM},
    distributional::{AverageReward, Support},
    memory::RelatedMemory,
    model::{ActorCritic, ModelBase},
    selector::{boltzmann, greedy, to_one_hot, ActionSelection},
    serve::ActionServer,
    twin::TwinNet,
    util::NamedTensors,
};
use anyhow::{anyhow, Result};
use cdrl_core::{
    error::CoreError,
    record::{Record, RecordValue},
    Env,
};
use std::convert::TryFrom;
use log::{debug, info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Weak};
use tch::{no_grad, Device, Kind, Tensor};

/// Multi-agent DDPG agent.
///
/// The critic scores the joint action of all neighbor slots. Target values bootstrap
/// from the actions this agent's actor would pick on each neighbor's next state.
pub struct Maddpg<P: ActorCritic, M> {
    pub(in crate::maddpg) index: usize,
    pub(in crate::maddpg) nets: TwinNet<P>,
    pub(in crate::maddpg) support: Support,
    pub(in crate::maddpg) action_selection: ActionSelection,
    pub(in crate::maddpg) n_actions: usize,
    pub(in crate::maddpg) batch_size: usize,
    pub(in crate::maddpg) discount_n: f64,
    pub(in crate::maddpg) average_reward: AverageReward,
    pub(in crate::maddpg) self_slot: usize,
    pub(in crate::maddpg) blind: BlindConfig,
    pub(in crate::maddpg) registry: Weak<SiblingRegistry<M>>,
    pub(in crate::maddpg) neighbor_indice: Vec<Option<usize>>,
    pub(in crate::maddpg) device: Device,
    pub(in crate::maddpg) n_opts: usize,
}

impl<P, M> Maddpg<P, M>
where
    P: ActorCritic,
    P::Config: DeserializeOwned + Serialize,
    M: RelatedMemory,
{
    /// Constructs the agent with `index` for the action space of `env`.
    ///
    /// The agent has no neighbors until [`Maddpg::update_neighbor_indice`] is called.
    pub fn build<E: Env>(config: MaddpgConfig<P::Config>, env: &E, index: usize) -> Result<Self> {
        let MaddpgConfig {
            agent: mut config,
            self_slot,
            blind,
        } = config;
        let device = config.tch_device();
        let nets = TwinNet::build(
            config.take_model_config()?,
            config.opt_config.clone(),
            device,
            config.pretrained_path(index),
        )?;
        let support = Support::new(config.v_min, config.v_max, config.atoms, device)?;
        info!(
            "Construct MADDPG agent {} with {} actions, {} atoms, own slot {}",
            index,
            env.action_size(),
            config.atoms,
            self_slot
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
            self_slot,
            blind,
            registry: Weak::new(),
            neighbor_indice: vec![],
            device,
            n_opts: 0,
        })
    }

    /// Gives the agent access to its siblings.
    pub fn assign_sister_nodes(&mut self, registry: &Arc<SiblingRegistry<M>>) -> Result<()> {
        if self.index >= registry.len() {
            return Err(CoreError::UnknownSibling(self.index).into());
        }
        self.registry = Arc::downgrade(registry);
        debug!("Agent {} joined a registry of {} agents", self.index, registry.len());
        Ok(())
    }

    /// Sets the sibling acting in each neighbor slot, `None` for an empty slot.
    pub fn update_neighbor_indice(&mut self, neighbor_indice: Vec<Option<usize>>) {
        trace!("Agent {} neighbors: {:?}", self.index, neighbor_indice);
        self.neighbor_indice = neighbor_indice;
    }

    /// The sibling acting in each neighbor slot.
    pub fn neighbor_indice(&self) -> &[Option<usize>] {
        &self.neighbor_indice
    }

    fn registry(&self) -> Result<Arc<SiblingRegistry<M>>> {
        self.registry
            .upgrade()
            .ok_or_else(|| CoreError::RegistryDropped.into())
    }

    /// Publishes a copy of the online parameters in the registry.
    pub fn publish_params(&self) -> Result<()> {
        self.registry()?
            .publish(self.index, self.nets.get_state_dict())
    }

    /// Parameters last published by sibling `index`.
    pub fn sibling_params(&self, index: usize) -> Result<Option<NamedTensors>> {
        self.registry()?.params(index)
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

    /// Actor outputs for the views of the neighbors in `state`, `[batch, slots, n_actions]`.
    ///
    /// Slots whose last action is `-1` are zero. See [`neighbor_windows`] for the layout.
    pub fn blind_neighbor_observation(
        &self,
        state: &Tensor,
        neighbor_action: &Tensor,
        target: bool,
    ) -> Result<Tensor> {
        no_grad(|| -> Result<Tensor> {
            let windows = neighbor_windows(state, neighbor_action, &self.blind)?;
            let batch_size = state.size()[0];
            let net = match target {
                true => self.nets.target().net(),
                false => self.nets.online().net(),
            };
            let outputs = windows
                .iter()
                .map(|window| match window {
                    Some(window) => net.actor(&window.to(self.device)),
                    None => Tensor::zeros(
                        [batch_size, self.n_actions as i64],
                        (Kind::Float, self.device),
                    ),
                })
                .collect::<Vec<_>>();
            Ok(Tensor::stack(&outputs, 1))
        })
    }

    /// Per-slot next actions picked by this agent's actor on the neighbors' next states.
    ///
    /// Empty slots are `-1`. The agent's own memory is read directly, siblings'
    /// memories through the registry.
    fn neighbor_selections(
        &self,
        memory: &M,
        batch_size: usize,
        data_ixs: &[usize],
    ) -> Result<Tensor> {
        let needs_registry = self
            .neighbor_indice
            .iter()
            .any(|j| matches!(j, Some(j) if *j != self.index));
        let registry = match needs_registry {
            true => Some(self.registry()?),
            false => None,
        };
        let online = self.nets.online().net();

        let mut columns = Vec::with_capacity(self.neighbor_indice.len());
        for neighbor in self.neighbor_indice.iter() {
            let column = match (neighbor, registry.as_ref()) {
                (None, _) => Tensor::full([batch_size as i64], -1i64, (Kind::Int64, self.device)),
                (Some(j), _) if *j == self.index => {
                    let related = memory.get_relate_sample(batch_size, data_ixs)?;
                    self.action_selection.select(
                        &online.actor(&related.next_states.to(self.device)),
                        &related.avails.to(self.device),
                    )?
                }
                (Some(j), Some(registry)) => {
                    let sibling = registry
                        .memory(*j)?
                        .read()
                        .map_err(|_| anyhow!("Memory of sibling {} is poisoned", j))?;
                    let related = sibling.get_relate_sample(batch_size, data_ixs)?;
                    self.action_selection.select(
                        &online.actor(&related.next_states.to(self.device)),
                        &related.avails.to(self.device),
                    )?
                }
                (Some(_), None) => return Err(CoreError::RegistryDropped.into()),
            };
            columns.push(column);
        }

        Ok(Tensor::stack(&columns, 1))
    }

    /// Performs a learning step on a batch sampled from the agent's own `memory`.
    ///
    /// `memory` must not be locked through the registry while calling this.
    pub fn learn(&mut self, memory: &mut M, mode: TaskMode) -> Result<Record> {
        if mode == TaskMode::Episodic {
            self.average_reward.reset();
        }
        let batch = memory
            .sample(self.batch_size, self.average_reward.value())?
            .to_device(self.device);
        let neighbor_actions = batch
            .neighbor_actions
            .as_ref()
            .ok_or_else(|| CoreError::ShapeMismatch("batch has no neighbor actions".into()))?;
        let n_slots = neighbor_actions.size()[1];
        if n_slots != self.neighbor_indice.len() as i64 || self.self_slot as i64 >= n_slots {
            return Err(CoreError::ShapeMismatch(format!(
                "{} neighbor slots in the batch, {} neighbor indices, own slot {}",
                n_slots,
                self.neighbor_indice.len(),
                self.self_slot
            ))
            .into());
        }
        let n_actions = self.n_actions as i64;
        let joint = to_one_hot(neighbor_actions, n_actions)?;

        let log_ps_a = self.nets.online().net().critic(&batch.states, &joint, true);

        self.nets.target_mut().net_mut().reset_noise();
        let (m, target_value, online_value) = no_grad(|| -> Result<_> {
            let selections =
                self.neighbor_selections(&*memory, batch.len(), &batch.data_ixs)?;
            let pns_a = self.nets.target().net().critic(
                &batch.next_states,
                &to_one_hot(&selections, n_actions)?,
                false,
            );
            let m = self.support.project(
                &batch.returns,
                &batch.nonterminals,
                self.discount_n,
                &pns_a,
            )?;
            let ps_a = self.nets.online().net().critic(&batch.states, &joint, false);

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

        // The own slot of the joint action is replaced by the actor output.
        let own = to_one_hot(&Tensor::from_slice(&[self.self_slot as i64]), n_slots)?
            .view([1, n_slots, 1])
            .to(self.device);
        let net = self.nets.online().net();
        let pi = net.actor(&batch.states);
        let joint_pi = &joint * (1.0 - &own) + pi.unsqueeze(1) * &own;
        let q = self
            .support
            .expectation(&net.critic(&batch.states, &joint_pi, false));
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
            "MADDPG {}: step {}, loss_critic = {}, loss_actor = {}",
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

impl<P, M> Agent for Maddpg<P, M>
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

impl<P, M> ActionServer for Maddpg<P, M>
where
    P: ActorCritic,
    P::Config: DeserializeOwned + Serialize,
    M: RelatedMemory,
{
    fn action_size(&self) -> usize {
        self.n_actions
    }

    fn serve_action(&mut self, obs: &Tensor, avail: &Tensor) -> Result<i64> {
        self.act_boltzmann(obs, avail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{Memory, RelatedSample, TransitionBatch},
        mlp::{ActorCriticMlp, ActorCriticMlpConfig},
        AgentConfig,
    };
    use cdrl_core::ActionSpace;
    use std::sync::{Mutex, RwLock};

    const DIM_OBS: i64 = 3;
    const N_ACTIONS: usize = 3;
    const N_POSITIONS: usize = 5;

    /// Answers related samples from fixed tensors and records the positions asked for.
    struct FixedMemory {
        next_states: Tensor,
        avails: Tensor,
        requested: Mutex<Vec<usize>>,
    }

    impl FixedMemory {
        /// Position `p` allows the single action `allowed(p)`.
        fn new(allowed: impl Fn(usize) -> usize) -> Self {
            let mut avails = vec![0.0f32; N_POSITIONS * N_ACTIONS];
            for p in 0..N_POSITIONS {
                avails[p * N_ACTIONS + allowed(p)] = 1.0;
            }
            Self {
                next_states: Tensor::randn(
                    [N_POSITIONS as i64, DIM_OBS],
                    (Kind::Float, Device::Cpu),
                ),
                avails: Tensor::from_slice(&avails).view([N_POSITIONS as i64, N_ACTIONS as i64]),
                requested: Mutex::new(vec![]),
            }
        }

        fn requested(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl Memory for FixedMemory {
        fn sample(&mut self, _batch_size: usize, _avg_reward: f64) -> Result<TransitionBatch> {
            Err(anyhow!("not sampled in these tests"))
        }

        fn update_priorities(&mut self, _ixs: &[usize], _priorities: &[f32]) -> Result<()> {
            Ok(())
        }
    }

    impl RelatedMemory for FixedMemory {
        fn get_relate_sample(&self, batch_size: usize, data_ixs: &[usize]) -> Result<RelatedSample> {
            assert_eq!(batch_size, data_ixs.len());
            self.requested.lock().unwrap().extend_from_slice(data_ixs);
            let ixs = data_ixs.iter().map(|&i| i as i64).collect::<Vec<_>>();
            let ixs = Tensor::from_slice(&ixs);
            Ok(RelatedSample {
                next_states: self.next_states.index_select(0, &ixs),
                avails: self.avails.index_select(0, &ixs),
            })
        }
    }

    fn agent() -> Maddpg<ActorCriticMlp, FixedMemory> {
        let model_config =
            ActorCriticMlpConfig::new(DIM_OBS, vec![8], N_ACTIONS as i64, 11).n_slots(3);
        let config = MaddpgConfig::default().agent(
            AgentConfig::default()
                .model_config(model_config)
                .atoms(11)
                .action_selection(ActionSelection::Greedy),
        );
        Maddpg::build(config, &ActionSpace(N_ACTIONS), 0).unwrap()
    }

    #[test_log::test]
    fn neighbor_selections_use_each_slot_memory() {
        // Own positions allow action 2 only, sibling position p allows p % 3 only.
        let own = Arc::new(RwLock::new(FixedMemory::new(|_| 2)));
        let sibling = Arc::new(RwLock::new(FixedMemory::new(|p| p % N_ACTIONS)));
        let registry = SiblingRegistry::new(vec![own.clone(), sibling.clone()]);
        let mut agent = agent();
        agent.assign_sister_nodes(&registry).unwrap();
        agent.update_neighbor_indice(vec![Some(0), Some(1), None]);

        let own = own.read().unwrap();
        let selections = agent.neighbor_selections(&own, 2, &[3, 1]).unwrap();
        assert_eq!(selections.size(), vec![2, 3]);
        let flat = Vec::<i64>::try_from(&selections.view([-1])).unwrap();
        assert_eq!(flat, vec![2, 0, -1, 2, 1, -1]);

        assert_eq!(own.requested(), vec![3, 1]);
        assert_eq!(sibling.read().unwrap().requested(), vec![3, 1]);

        let empty = to_one_hot(&selections.select(1, 2), N_ACTIONS as i64).unwrap();
        assert_eq!(empty.abs().sum(Kind::Float).double_value(&[]), 0.0);
    }

    #[test_log::test]
    fn own_and_empty_slots_need_no_registry() {
        let own = FixedMemory::new(|p| (p + 1) % N_ACTIONS);
        let mut agent = agent();
        agent.update_neighbor_indice(vec![None, Some(0)]);

        let selections = agent.neighbor_selections(&own, 3, &[0, 4, 2]).unwrap();
        let flat = Vec::<i64>::try_from(&selections.view([-1])).unwrap();
        assert_eq!(flat, vec![-1, 1, -1, 2, -1, 0]);
    }
}
