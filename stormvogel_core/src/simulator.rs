//! Random simulation of models.
//!
//! Runs are seeded, so that simulating with the same seed gives the same paths
//! regardless of whether runs are executed sequentially or in parallel.

use crate::{Action, Model, Scheduler, SchedulerError, StateId};
use log::{info, trace};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::{
    collections::{BTreeSet, HashMap},
    time::Instant,
};
use thiserror::Error;

/// The error type for simulations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The model has no states.
    #[error("the model has no initial state")]
    NoInitialState,
    /// The scheduler refers to an older revision of the model.
    #[error("the scheduler was built for a different revision of the model")]
    StaleScheduler,
    /// The scheduler does not resolve a choice.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// The branch taken from the state has values that cannot be sampled.
    #[error("state {0} has non-numeric or negative transition values")]
    NonNumeric(StateId),
    /// The partial model could not be assembled.
    #[error("failed assembling the partial model")]
    Model(#[from] crate::ModelError),
}

/// A finite path through a model: the initial state followed by the taken steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    initial: StateId,
    steps: Vec<(Action, StateId)>,
}

impl Path {
    /// The state the path starts from.
    pub fn initial(&self) -> StateId {
        self.initial
    }

    /// The steps of the path: the action taken and the state reached.
    pub fn steps(&self) -> &[(Action, StateId)] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Tells whether no step was taken.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The visited states, in order, starting from the initial one.
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        std::iter::once(self.initial).chain(self.steps.iter().map(|(_, state)| *state))
    }

    /// Streams the path into a [`Tracer`].
    pub fn trace<T: Tracer>(&self, model: &Model, mut tracer: T) {
        tracer.init(model, self.initial);
        for (step, (action, state)) in self.steps.iter().enumerate() {
            tracer.trace(model, step + 1, *action, *state);
        }
        tracer.finalize();
    }
}

/// Trait that handles streaming of paths,
/// e.g., to print them to file.
pub trait Tracer {
    /// Initialize new streaming from the initial state of a path.
    ///
    /// This method needs to be called once, before calls to [`Self::trace`].
    fn init(&mut self, model: &Model, initial: StateId);

    /// Stream a new step of the path.
    fn trace(&mut self, model: &Model, step: usize, action: Action, state: StateId);

    /// Finalize and close streaming.
    ///
    /// This method needs to be called at the end of the path.
    fn finalize(self);
}

// Dummy Tracer that does nothing
impl Tracer for () {
    fn init(&mut self, _model: &Model, _initial: StateId) {}

    fn trace(&mut self, _model: &Model, _step: usize, _action: Action, _state: StateId) {}

    fn finalize(self) {}
}

fn pick_action<R: Rng>(
    model: &Model,
    state: StateId,
    scheduler: Option<&Scheduler>,
    rng: &mut R,
) -> Result<Option<Action>, SimulationError> {
    let Some(choice) = model.get_choice(state).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if choice.len() == 1 {
        Ok(choice.actions().next())
    } else if let Some(scheduler) = scheduler {
        Ok(Some(scheduler.get_choice_of_state(state)?))
    } else {
        Ok(choice.actions().nth(rng.random_range(0..choice.len())))
    }
}

fn pick_successor<R: Rng>(
    model: &Model,
    state: StateId,
    action: Action,
    rng: &mut R,
) -> Result<StateId, SimulationError> {
    let branch = model
        .get_choice(state)
        .and_then(|choice| choice.get(action))
        .ok_or(SimulationError::NonNumeric(state))?;
    // Probabilities and rates alike are sampled proportionally
    let weights = branch
        .values()
        .map(|value| value.as_f64().filter(|w| *w >= 0.))
        .collect::<Option<Vec<f64>>>()
        .ok_or(SimulationError::NonNumeric(state))?;
    let total = weights.iter().sum::<f64>();
    if total <= 0. {
        return Err(SimulationError::NonNumeric(state));
    }
    let mut sample = rng.random::<f64>() * total;
    let mut targets = branch.targets().zip(weights).peekable();
    while let Some((target, weight)) = targets.next() {
        if sample < weight || targets.peek().is_none() {
            return Ok(target);
        }
        sample -= weight;
    }
    Err(SimulationError::NonNumeric(state))
}

/// Simulates a path of at most `steps` steps from the initial state.
///
/// Choices among actions are resolved by the scheduler, if given, or uniformly at random.
/// The path stops early in states without outgoing transitions.
pub fn simulate_path<R: Rng>(
    model: &Model,
    steps: usize,
    scheduler: Option<&Scheduler>,
    rng: &mut R,
) -> Result<Path, SimulationError> {
    if scheduler.is_some_and(|scheduler| !scheduler.is_valid_for(model)) {
        return Err(SimulationError::StaleScheduler);
    }
    let initial = model
        .get_initial_state()
        .ok_or(SimulationError::NoInitialState)?;
    let mut path = Path {
        initial,
        steps: Vec::with_capacity(steps),
    };
    let mut state = initial;
    for _ in 0..steps {
        let Some(action) = pick_action(model, state, scheduler, rng)? else {
            trace!("path stopped in absorbing state {state}");
            break;
        };
        state = pick_successor(model, state, action, rng)?;
        path.steps.push((action, state));
    }
    Ok(path)
}

fn run(
    model: &Model,
    steps: usize,
    scheduler: Option<&Scheduler>,
    seed: u64,
    run: usize,
) -> Result<Path, SimulationError> {
    let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(run as u64));
    simulate_path(model, steps, scheduler, &mut rng)
}

/// Simulates `runs` paths and returns the partial model made of the visited states
/// and of the choices taken along the paths.
///
/// State ids, labels, valuations and rewards are those of the original model.
pub fn simulate(
    model: &Model,
    steps: usize,
    runs: usize,
    scheduler: Option<&Scheduler>,
    seed: u64,
) -> Result<Model, SimulationError> {
    let mut visited = BTreeSet::new();
    let mut taken: HashMap<StateId, BTreeSet<Action>> = HashMap::new();
    for r in 0..runs {
        let path = run(model, steps, scheduler, seed, r)?;
        visited.insert(path.initial);
        let mut state = path.initial;
        for (action, next) in path.steps {
            taken.entry(state).or_default().insert(action);
            visited.insert(next);
            state = next;
        }
    }
    let visited = model
        .state_ids()
        .iter()
        .filter(|id| visited.contains(id))
        .copied()
        .collect::<Vec<_>>();
    let mut partial = model.get_sub_model(&visited)?;
    for state in visited {
        let choice = partial
            .get_choice(state)
            .map(|choice| {
                choice
                    .iter()
                    .filter(|(action, _)| taken.get(&state).is_some_and(|t| t.contains(action)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        partial.set_choice(state, choice)?;
    }
    Ok(partial)
}

/// Simulates `runs` paths, each seeded with `seed + run`, and streams them into clones of the tracer.
pub fn simulate_paths<T>(
    model: &Model,
    steps: usize,
    runs: usize,
    scheduler: Option<&Scheduler>,
    seed: u64,
    tracer: T,
) -> Result<(), SimulationError>
where
    T: Tracer + Clone,
{
    info!("simulation starting");
    let start_time = Instant::now();

    (0..runs).try_for_each(|r| {
        run(model, steps, scheduler, seed, r).map(|path| path.trace(model, tracer.clone()))
    })?;

    let elapsed = start_time.elapsed();
    info!("simulation time elapsed: {elapsed:0.2?}");
    Ok(())
}

/// Multi-threaded version of [`simulate_paths`].
pub fn par_simulate_paths<T>(
    model: &Model,
    steps: usize,
    runs: usize,
    scheduler: Option<&Scheduler>,
    seed: u64,
    tracer: T,
) -> Result<(), SimulationError>
where
    T: Tracer + Clone + Sync,
{
    info!("simulation starting");
    let start_time = Instant::now();

    (0..runs).into_par_iter().try_for_each(|r| {
        run(model, steps, scheduler, seed, r).map(|path| path.trace(model, tracer.clone()))
    })?;

    let elapsed = start_time.elapsed();
    info!("simulation time elapsed: {elapsed:0.2?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use std::sync::{Arc, Mutex};

    fn chain() -> Model {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let a = dtmc.new_state(["a"]);
        let b = dtmc.new_state(["b"]);
        dtmc.set_probabilistic_choice(init, vec![(Value::one(), a)])
            .unwrap();
        dtmc.set_probabilistic_choice(a, vec![(Value::one(), b)])
            .unwrap();
        dtmc
    }

    #[test]
    fn deterministic_path() {
        let dtmc = chain();
        let mut rng = SmallRng::seed_from_u64(0);
        let path = simulate_path(&dtmc, 10, None, &mut rng).unwrap();
        // stops in the absorbing state
        assert_eq!(path.len(), 2);
        assert_eq!(path.states().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn same_seed_same_paths() {
        let mut dtmc = Model::new_dtmc();
        let init = dtmc.get_initial_state().unwrap();
        let s = dtmc.new_state(["s"]);
        dtmc.set_probabilistic_choice(init, vec![(Value::ratio(1, 2), init), (Value::ratio(1, 2), s)])
            .unwrap();
        dtmc.add_self_loops();
        let one = run(&dtmc, 20, None, 7, 3).unwrap();
        let other = run(&dtmc, 20, None, 7, 3).unwrap();
        assert_eq!(one, other);
        assert_eq!(one.len(), 20);
    }

    #[test]
    fn stale_scheduler() {
        let mut mdp = Model::new_mdp();
        let mut rng = SmallRng::seed_from_u64(0);
        let scheduler = Scheduler::random(&mdp, &mut rng);
        mdp.new_state(["s"]);
        assert_eq!(
            simulate_path(&mdp, 1, Some(&scheduler), &mut rng),
            Err(SimulationError::StaleScheduler)
        );
    }

    #[test]
    fn partial_model() {
        let mut mdp = Model::new_mdp();
        let init = mdp.get_initial_state().unwrap();
        let left = mdp.new_state(["left"]);
        let right = mdp.new_state(["right"]);
        let l = mdp.new_action(["l"]).unwrap();
        let r = mdp.new_action(["r"]).unwrap();
        mdp.set_action_choice(init, vec![(l, left), (r, right)])
            .unwrap();
        mdp.add_self_loops();
        let scheduler = Scheduler::new(&mdp, HashMap::from([(init, l)])).unwrap();
        let partial = simulate(&mdp, 5, 10, Some(&scheduler), 0).unwrap();
        assert_eq!(partial.nr_states(), 2);
        assert!(partial.get_state(right).is_none());
        assert_eq!(
            partial.get_choice(init).unwrap().actions().collect::<Vec<_>>(),
            vec![l]
        );
    }

    #[derive(Clone)]
    struct Counter(Arc<Mutex<usize>>);

    impl Tracer for Counter {
        fn init(&mut self, _model: &Model, _initial: StateId) {}

        fn trace(&mut self, _model: &Model, _step: usize, _action: Action, _state: StateId) {
            *self.0.lock().unwrap() += 1;
        }

        fn finalize(self) {}
    }

    #[test]
    fn parallel_tracing() {
        let dtmc = chain();
        let counter = Counter(Arc::new(Mutex::new(0)));
        par_simulate_paths(&dtmc, 10, 8, None, 0, counter.clone()).unwrap();
        assert_eq!(*counter.0.lock().unwrap(), 16);
        simulate_paths(&dtmc, 10, 8, None, 0, counter.clone()).unwrap();
        assert_eq!(*counter.0.lock().unwrap(), 32);
    }
}
