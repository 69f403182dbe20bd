use cdrl_core::{error::CoreError, ActionSpace};
use cdrl_tch_agent::{
    maddpg::{BlindConfig, Maddpg, MaddpgConfig, SiblingRegistry},
    memory::{PrioritizedMemory, PrioritizedMemoryConfig, Transition},
    mlp::{ActorCriticMlp, ActorCriticMlpConfig},
    opt::OptimizerConfig,
    Agent, AgentConfig, TaskMode,
};
use std::sync::{Arc, RwLock};
use tch::{Device, Kind, Tensor};

const DIM_OBS: i64 = 5;
const N_ACTIONS: usize = 3;
const N_SLOTS: i64 = 2;
const ATOMS: i64 = 11;
const BATCH_SIZE: usize = 8;
const N_TRANSITIONS: usize = 24;

type MaddpgMlp = Maddpg<ActorCriticMlp, PrioritizedMemory>;

fn agent_config(in_dim: i64) -> AgentConfig<ActorCriticMlpConfig> {
    AgentConfig::default()
        .model_config(
            ActorCriticMlpConfig::new(in_dim, vec![16], N_ACTIONS as i64, ATOMS).n_slots(N_SLOTS),
        )
        .opt_config(OptimizerConfig::Adam { lr: 1e-3, eps: 1e-8 })
        .atoms(ATOMS)
        .batch_size(BATCH_SIZE)
}

fn agent(index: usize) -> MaddpgMlp {
    let config = MaddpgConfig::default()
        .agent(agent_config(DIM_OBS))
        .self_slot(index);
    Maddpg::build(config, &ActionSpace(N_ACTIONS), index).unwrap()
}

/// Memories of two agents filled in lockstep, so storage positions line up.
fn registry() -> Arc<SiblingRegistry<PrioritizedMemory>> {
    let config = PrioritizedMemoryConfig::default().capacity(64);
    let mut memories = vec![
        PrioritizedMemory::build(&config, N_ACTIONS),
        PrioritizedMemory::build(&config, N_ACTIONS),
    ];
    for k in 0..N_TRANSITIONS {
        let a0 = (k % N_ACTIONS) as i64;
        let a1 = match k % 4 {
            0 => -1,
            _ => ((k + 1) % N_ACTIONS) as i64,
        };
        for (i, memory) in memories.iter_mut().enumerate() {
            let mut next_avail = vec![1.0; N_ACTIONS];
            next_avail[(k + i) % N_ACTIONS] = 0.0;
            memory
                .push(Transition {
                    state: Tensor::randn([DIM_OBS], (Kind::Float, Device::Cpu)),
                    action: if i == 0 { a0 } else { a1.max(0) },
                    neighbor_actions: vec![a0, a1],
                    ret: 1.0 - i as f32,
                    next_state: Tensor::randn([DIM_OBS], (Kind::Float, Device::Cpu)),
                    next_avail,
                    nonterminal: k % 5 != 0,
                })
                .unwrap();
        }
    }
    SiblingRegistry::new(
        memories
            .into_iter()
            .map(|m| Arc::new(RwLock::new(m)))
            .collect(),
    )
}

#[test_log::test]
fn siblings_learn_through_shared_memories() {
    let registry = registry();
    let mut agents = vec![agent(0), agent(1)];
    for agent in agents.iter_mut() {
        agent.assign_sister_nodes(&registry).unwrap();
        agent.update_neighbor_indice(vec![Some(0), Some(1)]);
    }

    for (i, agent) in agents.iter_mut().enumerate() {
        let before = agent.get_state_dict();
        let memory = registry.memory(i).unwrap().clone();
        let mut memory = memory.write().unwrap();
        let record = agent.learn(&mut *memory, TaskMode::Continuing).unwrap();

        assert!(record.get_scalar("loss_critic").unwrap().is_finite());
        assert!(record.get_scalar("loss_actor").unwrap().is_finite());
        assert!(!agent.get_state_dict().equal(&before));
    }
}

#[test_log::test]
fn empty_neighbor_slot_needs_no_sibling() {
    let registry = registry();
    let mut agent = agent(0);
    agent.assign_sister_nodes(&registry).unwrap();
    agent.update_neighbor_indice(vec![Some(0), None]);
    assert_eq!(agent.neighbor_indice(), &[Some(0), None]);

    let memory = registry.memory(0).unwrap().clone();
    drop(registry);
    let mut memory = memory.write().unwrap();
    agent.learn(&mut *memory, TaskMode::Episodic).unwrap();
}

#[test_log::test]
fn dropped_registry_is_an_error() {
    let registry = registry();
    let mut agent = agent(0);
    agent.assign_sister_nodes(&registry).unwrap();
    agent.update_neighbor_indice(vec![Some(0), Some(1)]);

    let memory = registry.memory(0).unwrap().clone();
    drop(registry);
    let mut memory = memory.write().unwrap();
    let err = agent.learn(&mut *memory, TaskMode::Continuing).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::RegistryDropped)
    ));
    assert!(agent.publish_params().is_err());
}

#[test_log::test]
fn inconsistent_neighbor_slots_are_rejected() {
    let registry = registry();
    let mut agent = agent(0);
    agent.assign_sister_nodes(&registry).unwrap();
    agent.update_neighbor_indice(vec![Some(0), Some(1), None]);

    let memory = registry.memory(0).unwrap().clone();
    let mut memory = memory.write().unwrap();
    let err = agent.learn(&mut *memory, TaskMode::Continuing).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::ShapeMismatch(_))
    ));
}

#[test_log::test]
fn unknown_agent_cannot_join_registry() {
    let registry = registry();
    let mut member = agent(0);
    let config = MaddpgConfig::default().agent(agent_config(DIM_OBS));
    let mut stranger: MaddpgMlp = Maddpg::build(config, &ActionSpace(N_ACTIONS), 7).unwrap();
    assert!(member.assign_sister_nodes(&registry).is_ok());
    assert!(stranger.assign_sister_nodes(&registry).is_err());
}

#[test_log::test]
fn published_params_reach_siblings() {
    let registry = registry();
    let mut agents = vec![agent(0), agent(1)];
    for agent in agents.iter_mut() {
        agent.assign_sister_nodes(&registry).unwrap();
    }
    assert!(agents[1].sibling_params(0).unwrap().is_none());

    agents[0].publish_params().unwrap();
    let params = agents[1].sibling_params(0).unwrap().unwrap();
    assert!(params.equal(&agents[0].get_state_dict()));

    agents[1].set_state_dict(&params).unwrap();
    assert!(agents[1].get_state_dict().equal(&agents[0].get_state_dict()));
}

#[test_log::test]
fn neighbor_views_follow_markers() {
    // Two channels of 5x5; the second marks neighbors at (0, 0) and (2, 1).
    let blind = BlindConfig {
        field_of_view: 3.0,
        square_step: 1.0,
        observation_dims: 1,
    };
    let config = MaddpgConfig::default()
        .agent(agent_config(2 * 5 * 5))
        .blind(blind);
    let agent: MaddpgMlp = Maddpg::build(config, &ActionSpace(N_ACTIONS), 0).unwrap();

    let state = Tensor::zeros([1, 2, 5, 5], (Kind::Float, Device::Cpu));
    let _ = state.get(0).get(1).get(0).get(0).fill_(1.0);
    let _ = state.get(0).get(1).get(2).get(1).fill_(1.0);
    let neighbor_action = Tensor::from_slice(&[-1i64, 2, 0]).view([1, 3]);

    let views = agent
        .blind_neighbor_observation(&state, &neighbor_action, false)
        .unwrap();
    assert_eq!(views.size(), vec![1, 3, N_ACTIONS as i64]);
    assert_eq!(views.get(0).get(0).abs().sum(Kind::Float).double_value(&[]), 0.0);

    let target = agent
        .blind_neighbor_observation(&state, &neighbor_action, true)
        .unwrap();
    assert!(views.allclose(&target, 1e-6, 1e-6, false));
}
