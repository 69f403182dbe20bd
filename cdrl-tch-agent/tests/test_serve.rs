use cdrl_core::{duplex, ActionSpace, ServerChannel};
use cdrl_tch_agent::{
    mlp::{CategoricalMlp, CategoricalMlpConfig},
    rainbow::{Rainbow, RainbowConfig},
    serve::{lookup_server, lookup_server_loop},
};
use std::thread;

const DIM_OBS: usize = 4;
const N_ACTIONS: usize = 5;
const N_WORKERS: usize = 4;
const N_REQUESTS: usize = 20;

fn agent() -> Rainbow<CategoricalMlp> {
    let config = RainbowConfig::default()
        .model_config(CategoricalMlpConfig::new(
            DIM_OBS as i64,
            vec![8],
            N_ACTIONS as i64,
            11,
        ))
        .atoms(11);
    Rainbow::build(config, &ActionSpace(N_ACTIONS), 0).unwrap()
}

/// Worker `k` only allows action `k`.
fn avail(k: usize) -> Vec<f32> {
    let mut avail = vec![0.0; N_ACTIONS];
    avail[k % N_ACTIONS] = 1.0;
    avail
}

#[test_log::test]
fn workers_receive_available_actions() {
    let (mut servers, workers): (Vec<_>, Vec<_>) = (0..N_WORKERS).map(|_| duplex()).unzip();
    let handles = workers
        .into_iter()
        .enumerate()
        .map(|(k, worker)| {
            thread::spawn(move || {
                let actions = (0..N_REQUESTS)
                    .map(|i| {
                        let obs = vec![i as f32; DIM_OBS];
                        worker.act(obs, vec![DIM_OBS], avail(k)).unwrap()
                    })
                    .collect::<Vec<_>>();
                worker.done().unwrap();
                actions
            })
        })
        .collect::<Vec<_>>();

    let mut agent = agent();
    lookup_server(&mut agent, &mut servers).unwrap();

    for (k, handle) in handles.into_iter().enumerate() {
        let actions = handle.join().unwrap();
        assert_eq!(actions.len(), N_REQUESTS);
        assert!(actions.iter().all(|&a| a == (k % N_ACTIONS) as i64));
    }
    assert!(servers.iter().all(|s| s.is_closed()));
}

#[test_log::test]
fn hung_up_worker_is_retired() {
    let (mut servers, mut workers): (Vec<_>, Vec<_>) = (0..2).map(|_| duplex()).unzip();
    let survivor = workers.pop().unwrap();
    drop(workers);

    let handle = thread::spawn(move || {
        let a = survivor.act(vec![0.0; DIM_OBS], vec![DIM_OBS], avail(3)).unwrap();
        survivor.done().unwrap();
        a
    });

    let mut agent = agent();
    while lookup_server_loop(&mut agent, &mut servers).unwrap() {
        thread::yield_now();
    }
    assert_eq!(handle.join().unwrap(), 3);
    assert!(servers.iter().all(|s| s.is_closed()));
}
